// Copyright 2025 Newswire Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP JSON-RPC surface
//!
//! One POST route accepting a single request object or an array batch.
//! Batch entries resolve independently and in order; one bad entry never
//! aborts its siblings. The body is parsed by hand so malformed JSON
//! yields a JSON-RPC parse error instead of a framework 400.

use crate::auth::{auth_middleware, AuthContext, AuthMode};
use crate::protocol::{JsonRpcError, JsonRpcId, JsonRpcResponse};
use crate::GatewayState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Router,
};
use newswire_core::{CallerContext, GatewayError, Protocol};
use std::sync::Arc;

pub struct HttpRpcAdapter {
    state: Arc<GatewayState>,
}

impl HttpRpcAdapter {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let mode = if self.state.config.auth.required {
            AuthMode::Required
        } else {
            AuthMode::Optional
        };
        Router::new()
            .route("/rpc", post(handle_rpc))
            .layer(middleware::from_fn(auth_middleware))
            .layer(Extension(self.state.authenticator.clone()))
            .layer(Extension(mode))
            .with_state(self.state.clone())
    }
}

async fn handle_rpc(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let payload: serde_json::Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            let resp = JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::parse_error(format!("Invalid JSON: {e}")),
            );
            return Json(resp).into_response();
        }
    };

    let caller = caller_key(&auth, &headers);
    let remaining = match state
        .limiter
        .check_request(&caller, Protocol::HttpRpc, "rpc", None)
    {
        Ok(remaining) => remaining,
        Err(err) => return rate_limited_response(&err),
    };

    let body = match payload {
        serde_json::Value::Array(entries) => {
            if entries.is_empty() {
                let resp = JsonRpcResponse::error(
                    JsonRpcId::Null,
                    JsonRpcError::invalid_request("Empty batch"),
                );
                return Json(resp).into_response();
            }
            let mut responses = Vec::with_capacity(entries.len());
            for entry in entries {
                responses.push(dispatch_entry(&state, &auth, &caller, entry).await);
            }
            serde_json::to_value(responses).unwrap_or_default()
        }
        single => serde_json::to_value(dispatch_entry(&state, &auth, &caller, single).await)
            .unwrap_or_default(),
    };

    let mut response = Json(body).into_response();
    if remaining != u32::MAX {
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            response.headers_mut().insert("X-RateLimit-Remaining", value);
        }
    }
    response
}

/// Resolve one batch entry, applying the per-tool rate layer for calls.
async fn dispatch_entry(
    state: &GatewayState,
    auth: &AuthContext,
    caller: &str,
    entry: serde_json::Value,
) -> JsonRpcResponse {
    let id: JsonRpcId = entry
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    if entry.get("method").and_then(|m| m.as_str()) == Some("tools/call") {
        if let Some(tool) = entry
            .pointer("/params/name")
            .and_then(|n| n.as_str())
        {
            if let Err(err) = state.limiter.check_tool(caller, tool) {
                return JsonRpcResponse::error(id, JsonRpcError::from_gateway(&err));
            }
        }
    }

    let ctx = CallerContext::new(
        Protocol::HttpRpc,
        auth.identity.clone(),
        auth.permissions.clone(),
    );
    state.dispatcher.dispatch_value(entry, ctx).await
}

fn caller_key(auth: &AuthContext, headers: &HeaderMap) -> String {
    auth.identity
        .as_ref()
        .map(|i| i.rate_key())
        .or_else(|| crate::auth::extract_client_ip(headers).map(|ip| format!("addr:{ip}")))
        .unwrap_or_else(|| "addr:unknown".to_string())
}

fn rate_limited_response(err: &GatewayError) -> Response {
    let resp = JsonRpcResponse::error(JsonRpcId::Null, JsonRpcError::from_gateway(err));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(resp)).into_response();
    if let GatewayError::RateLimited { retry_after_secs, .. } = err {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
            response.headers_mut().insert("Retry-After", value);
        }
    }
    response
        .headers_mut()
        .insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    response
}
