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

//! REST surface
//!
//! Resource-style discovery and execution routes plus the operational
//! endpoints. Failure kinds map to HTTP statuses through the error's own
//! mapping; `/health` bypasses authentication and every rate-limit layer
//! so probes keep working under load.

use crate::auth::{auth_middleware, AuthContext, AuthMode};
use crate::GatewayState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use newswire_core::{CallerContext, GatewayError, Protocol};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Ceiling on batch size; larger payloads are refused outright.
const MAX_BATCH: usize = 25;

pub struct RestAdapter {
    state: Arc<GatewayState>,
}

impl RestAdapter {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let mode = if self.state.config.auth.required {
            AuthMode::Required
        } else {
            AuthMode::Optional
        };

        let api = Router::new()
            .route("/api/v1/tools", get(list_tools))
            .route("/api/v1/tools/execute", post(execute_batch))
            .route("/api/v1/tools/:name", get(get_tool))
            .route("/api/v1/tools/:name/execute", post(execute_tool))
            .layer(middleware::from_fn(auth_middleware))
            .layer(Extension(self.state.authenticator.clone()))
            .layer(Extension(mode));

        let operational = Router::new()
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/metrics", get(metrics))
            .route("/docs", get(docs));

        api.merge(operational).with_state(self.state.clone())
    }
}

/// REST-rendered gateway failure.
struct RestError(GatewayError);

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": {
                "kind": err.kind(),
                "message": err.to_string(),
            }
        });
        if let GatewayError::RateLimited { retry_after_secs, .. } = &err {
            body["error"]["retryAfterSeconds"] = json!(retry_after_secs);
        }
        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited { retry_after_secs, remaining } = &err {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                headers.insert("Retry-After", value);
            }
            if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("X-RateLimit-Remaining", value);
            }
        }
        response
    }
}

fn caller_key(auth: &AuthContext, headers: &HeaderMap) -> String {
    auth.identity
        .as_ref()
        .map(|i| i.rate_key())
        .or_else(|| crate::auth::extract_client_ip(headers).map(|ip| format!("addr:{ip}")))
        .unwrap_or_else(|| "addr:unknown".to_string())
}

fn with_remaining(mut response: Response, remaining: u32) -> Response {
    if remaining != u32::MAX {
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            response.headers_mut().insert("X-RateLimit-Remaining", value);
        }
    }
    response
}

async fn list_tools(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
) -> Response {
    let caller = caller_key(&auth, &headers);
    let remaining =
        match state
            .limiter
            .check_request(&caller, Protocol::Rest, "discovery", None)
        {
            Ok(r) => r,
            Err(err) => return RestError(err).into_response(),
        };
    let response = Json(json!({ "tools": state.registry.list() })).into_response();
    with_remaining(response, remaining)
}

async fn get_tool(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    let caller = caller_key(&auth, &headers);
    let remaining =
        match state
            .limiter
            .check_request(&caller, Protocol::Rest, "discovery", None)
        {
            Ok(r) => r,
            Err(err) => return RestError(err).into_response(),
        };
    let response = match state.registry.get(&name) {
        Some(tool) => Json(tool.descriptor()).into_response(),
        None => RestError(GatewayError::UnknownTool(name)).into_response(),
    };
    with_remaining(response, remaining)
}

async fn execute_tool(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Path(name): Path<String>,
    body: String,
) -> Response {
    let caller = caller_key(&auth, &headers);
    let remaining = match state
        .limiter
        .check_request(&caller, Protocol::Rest, "execute", Some(&name))
    {
        Ok(r) => r,
        Err(err) => return RestError(err).into_response(),
    };

    // An absent body means no arguments; a present-but-unparseable one is
    // a caller error, not an empty argument set.
    let arguments = if body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                let err = GatewayError::InvalidRequest(format!("invalid JSON body: {e}"));
                return with_remaining(RestError(err).into_response(), remaining);
            }
        }
    };
    let ctx = CallerContext::new(Protocol::Rest, auth.identity.clone(), auth.permissions.clone());
    let correlation_id = ctx.correlation_id;

    state.metrics.requests.fetch_add(1, Ordering::Relaxed);
    let response = match state.registry.invoke(&name, arguments, ctx).await {
        Ok(output) => Json(json!({
            "tool": name,
            "result": output,
            "correlationId": correlation_id.to_string(),
        }))
        .into_response(),
        Err(err) => {
            state.metrics.failures.fetch_add(1, Ordering::Relaxed);
            RestError(err).into_response()
        }
    };
    with_remaining(response, remaining)
}

#[derive(Debug, Deserialize)]
struct BatchEntry {
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

async fn execute_batch(
    State(state): State<Arc<GatewayState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let caller = caller_key(&auth, &headers);
    let remaining =
        match state
            .limiter
            .check_request(&caller, Protocol::Rest, "execute", None)
        {
            Ok(r) => r,
            Err(err) => return RestError(err).into_response(),
        };

    let entries = match body.as_array() {
        Some(entries) => entries.clone(),
        None => {
            return RestError(GatewayError::InvalidRequest(
                "batch body must be an array".into(),
            ))
            .into_response();
        }
    };
    if entries.is_empty() {
        return RestError(GatewayError::InvalidRequest("empty batch".into())).into_response();
    }
    if entries.len() > MAX_BATCH {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": {
                    "kind": "batch_too_large",
                    "message": format!("batch size {} exceeds maximum {MAX_BATCH}", entries.len()),
                }
            })),
        )
            .into_response();
    }

    // Settle-all: every entry resolves in input order, failures included.
    let mut results = Vec::with_capacity(entries.len());
    let mut succeeded = 0usize;
    for raw in entries {
        let outcome = settle_entry(&state, &auth, &caller, raw).await;
        if outcome["ok"] == json!(true) {
            succeeded += 1;
        }
        results.push(outcome);
    }

    let total = results.len();
    let response = Json(json!({
        "results": results,
        "summary": {
            "total": total,
            "succeeded": succeeded,
            "failed": total - succeeded,
        }
    }))
    .into_response();
    with_remaining(response, remaining)
}

async fn settle_entry(
    state: &GatewayState,
    auth: &AuthContext,
    caller: &str,
    raw: serde_json::Value,
) -> serde_json::Value {
    let entry: BatchEntry = match serde_json::from_value(raw) {
        Ok(e) => e,
        Err(e) => {
            return json!({
                "ok": false,
                "error": {
                    "kind": "invalid_request",
                    "message": format!("malformed batch entry: {e}"),
                }
            });
        }
    };

    if let Err(err) = state.limiter.check_tool(caller, &entry.tool) {
        return entry_error(&entry.tool, &err);
    }

    let ctx = CallerContext::new(Protocol::Rest, auth.identity.clone(), auth.permissions.clone());
    state.metrics.requests.fetch_add(1, Ordering::Relaxed);
    match state.registry.invoke(&entry.tool, entry.arguments, ctx).await {
        Ok(output) => json!({ "ok": true, "tool": entry.tool, "result": output }),
        Err(err) => {
            state.metrics.failures.fetch_add(1, Ordering::Relaxed);
            entry_error(&entry.tool, &err)
        }
    }
}

fn entry_error(tool: &str, err: &GatewayError) -> serde_json::Value {
    let mut error = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let GatewayError::RateLimited { retry_after_secs, .. } = err {
        error["retryAfterSeconds"] = json!(retry_after_secs);
    }
    json!({ "ok": false, "tool": tool, "error": error })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.metrics.started_at.elapsed().as_secs(),
        "tools": state.registry.len(),
        "connections": state.connections.len(),
        "protocols": {
            "stdio": state.config.protocols.stdio,
            "httpRpc": state.config.protocols.http_rpc,
            "websocket": state.config.protocols.websocket,
            "rest": state.config.protocols.rest,
        }
    }))
}

async fn metrics(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(json!({
        "uptimeSeconds": state.metrics.started_at.elapsed().as_secs(),
        "invocations": state.metrics.requests.load(Ordering::Relaxed),
        "failures": state.metrics.failures.load(Ordering::Relaxed),
        "openConnections": state.connections.len(),
    }))
}

/// Endpoint reference, negotiated between HTML and JSON on `Accept`.
async fn docs(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let wants_html = headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);

    let tools: Vec<String> = state.registry.list().into_iter().map(|d| d.name).collect();

    if wants_html {
        let rows: String = tools
            .iter()
            .map(|name| format!("<li><code>{name}</code></li>"))
            .collect();
        Html(format!(
            "<!DOCTYPE html><html><head><title>Newswire Gateway</title></head><body>\
             <h1>Newswire Gateway</h1>\
             <h2>Endpoints</h2><ul>\
             <li><code>GET /api/v1/tools</code></li>\
             <li><code>GET /api/v1/tools/:name</code></li>\
             <li><code>POST /api/v1/tools/:name/execute</code></li>\
             <li><code>POST /api/v1/tools/execute</code></li>\
             <li><code>POST /rpc</code></li>\
             <li><code>GET /ws</code></li>\
             </ul><h2>Tools</h2><ul>{rows}</ul></body></html>"
        ))
        .into_response()
    } else {
        Json(json!({
            "endpoints": [
                { "method": "GET", "path": "/api/v1/tools" },
                { "method": "GET", "path": "/api/v1/tools/:name" },
                { "method": "POST", "path": "/api/v1/tools/:name/execute" },
                { "method": "POST", "path": "/api/v1/tools/execute" },
                { "method": "POST", "path": "/rpc" },
                { "method": "GET", "path": "/ws" },
                { "method": "GET", "path": "/health" },
                { "method": "GET", "path": "/status" },
                { "method": "GET", "path": "/metrics" },
            ],
            "tools": tools,
        }))
        .into_response()
    }
}
