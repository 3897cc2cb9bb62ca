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

//! Shared JSON-RPC method dispatcher
//!
//! The pipe, HTTP, and WebSocket surfaces all hand parsed requests here.
//! The dispatcher validates the envelope, routes methods, and renders
//! every failure kind through the error code registry. It never panics
//! and never closes the caller's transport.

use crate::catalog;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ServerCapabilities, ServerInfo, ToolsCapability, GATEWAY_PROTOCOL_VERSION,
    JSONRPC_VERSION,
};
use newswire_core::{CallerContext, ToolRegistry};
use serde_json::json;
use std::sync::Arc;

pub struct RpcDispatcher {
    registry: Arc<ToolRegistry>,
}

impl RpcDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Parse and dispatch one raw JSON value.
    ///
    /// Malformed envelopes still produce a well-formed error response so
    /// a bad message never drops the caller's line.
    pub async fn dispatch_value(
        &self,
        raw: serde_json::Value,
        ctx: CallerContext,
    ) -> JsonRpcResponse {
        // Pull the id out before full deserialization so a malformed
        // request still echoes it.
        let id = raw
            .get("id")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(req) => req,
            Err(e) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_request(format!("Malformed request: {e}")),
                );
            }
        };

        self.dispatch(request, ctx).await
    }

    /// Dispatch a parsed request.
    pub async fn dispatch(&self, request: JsonRpcRequest, ctx: CallerContext) -> JsonRpcResponse {
        if request.jsonrpc != JSONRPC_VERSION {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported JSON-RPC version: {}",
                    request.jsonrpc
                )),
            );
        }

        let id = request.id.clone();
        tracing::debug!(
            method = %request.method,
            protocol = %ctx.protocol,
            correlation_id = %ctx.correlation_id,
            "dispatching request"
        );

        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                serde_json::to_value(self.initialize_result()).unwrap_or_default(),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => {
                JsonRpcResponse::success(id, json!({ "tools": self.registry.list() }))
            }
            "tools/call" => self.call_tool(id, request.params, ctx).await,
            "resources/list" => {
                JsonRpcResponse::success(id, json!({ "resources": catalog::static_resources() }))
            }
            "resources/read" => {
                let uri = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("uri"))
                    .and_then(|u| u.as_str());
                match uri.and_then(catalog::read_resource) {
                    Some(contents) => JsonRpcResponse::success(id, contents),
                    None => JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params("Unknown resource uri"),
                    ),
                }
            }
            "prompts/list" => {
                JsonRpcResponse::success(id, json!({ "prompts": catalog::static_prompts() }))
            }
            "prompts/get" => {
                let name = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("name"))
                    .and_then(|n| n.as_str());
                match name.and_then(catalog::get_prompt) {
                    Some(prompt) => JsonRpcResponse::success(id, prompt),
                    None => JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params("Unknown prompt name"),
                    ),
                }
            }
            other => JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
        }
    }

    async fn call_tool(
        &self,
        id: crate::protocol::JsonRpcId,
        params: Option<serde_json::Value>,
        ctx: CallerContext,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Bad tools/call params: {e}")),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("tools/call requires params"),
                );
            }
        };

        match self.registry.invoke(&params.name, params.arguments, ctx).await {
            Ok(output) => JsonRpcResponse::success(
                id,
                serde_json::to_value(CallToolResult::text(output)).unwrap_or_default(),
            ),
            Err(err) => JsonRpcResponse::error(id, JsonRpcError::from_gateway(&err)),
        }
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: GATEWAY_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: "newswire-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}
