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

//! Wire envelope types
//!
//! JSON-RPC 2.0 message types shared by the pipe, HTTP, and WebSocket
//! surfaces, plus the WebSocket-native event envelope.

use newswire_core::GatewayError;
use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Gateway protocol revision advertised in `initialize`
pub const GATEWAY_PROTOCOL_VERSION: &str = "2025-06-18";

// =============================================================================
// Core JSON-RPC 2.0 Types
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub id: JsonRpcId,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: JsonRpcId,
}

/// JSON-RPC 2.0 ID (can be string, number, or null)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
    #[default]
    Null,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Parse error (-32700)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    /// Invalid request (-32600)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    /// Map a gateway failure to its registered code, carrying the kind tag
    /// (and retry hint, when present) in `data`.
    pub fn from_gateway(err: &GatewayError) -> Self {
        let data = match err {
            GatewayError::RateLimited { retry_after_secs, .. } => serde_json::json!({
                "kind": err.kind(),
                "retryAfterSeconds": retry_after_secs,
            }),
            _ => serde_json::json!({ "kind": err.kind() }),
        };
        Self {
            code: err.json_rpc_code(),
            message: err.to_string(),
            data: Some(data),
        }
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: JsonRpcId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

// =============================================================================
// Gateway Protocol Types
// =============================================================================

/// Server capabilities advertised during initialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Result of the `initialize` handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Parameters for `tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Result of `tools/call`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text { text: String },
}

/// Static resource advertised by `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Static prompt advertised by `prompts/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// =============================================================================
// WebSocket Event Envelope
// =============================================================================

/// Message kinds on the WebSocket surface beyond plain JSON-RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WsKind {
    Welcome,
    Ping,
    Pong,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Progress,
    Event,
    Error,
}

/// WebSocket-native envelope for non-RPC frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: WsKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl WsEnvelope {
    pub fn new(kind: WsKind) -> Self {
        Self {
            kind,
            id: None,
            topic: None,
            data: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_id(mut self, id: JsonRpcId) -> Self {
        self.id = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_id_defaults_to_null() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "tools/list" })).unwrap();
        assert_eq!(req.id, JsonRpcId::Null);
    }

    #[test]
    fn test_id_roundtrip_shapes() {
        let s: JsonRpcId = serde_json::from_value(json!("abc")).unwrap();
        assert_eq!(s, JsonRpcId::String("abc".into()));
        let n: JsonRpcId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(n, JsonRpcId::Number(7));
        let null: JsonRpcId = serde_json::from_value(json!(null)).unwrap();
        assert_eq!(null, JsonRpcId::Null);
    }

    #[test]
    fn test_response_never_carries_both() {
        let ok = JsonRpcResponse::success(JsonRpcId::Number(1), json!("fine"));
        assert!(ok.result.is_some() && ok.error.is_none());

        let err = JsonRpcResponse::error(
            JsonRpcId::Number(2),
            JsonRpcError::method_not_found("bogus"),
        );
        assert!(err.result.is_none() && err.error.is_some());

        let raw = serde_json::to_value(&ok).unwrap();
        assert!(raw.get("error").is_none());
    }

    #[test]
    fn test_rate_limit_error_carries_retry_hint() {
        let gateway_err = GatewayError::RateLimited { retry_after_secs: 12, remaining: 0 };
        let rpc = JsonRpcError::from_gateway(&gateway_err);
        assert_eq!(rpc.code, -32005);
        assert_eq!(rpc.data.as_ref().unwrap()["retryAfterSeconds"], 12);
    }

    #[test]
    fn test_ws_envelope_shape() {
        let env = WsEnvelope::new(WsKind::Progress)
            .with_id(JsonRpcId::Number(5))
            .with_data(json!({ "stage": "fetching" }));
        let raw = serde_json::to_value(&env).unwrap();
        assert_eq!(raw["type"], "progress");
        assert_eq!(raw["id"], 5);
        assert!(raw.get("topic").is_none());
    }
}
