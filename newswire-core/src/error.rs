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

//! Gateway failure kinds
//!
//! Every adapter renders the same set of failure kinds into its own wire
//! format. The kind is carried structurally end to end - adapters never
//! inspect error message strings to decide how to respond.

use thiserror::Error;

/// Protocol-agnostic gateway failure.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Forbidden: missing permission(s) {0}")]
    Forbidden(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
        remaining: u32,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tool invocation timed out after {0}ms")]
    Timeout(u64),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid parameter schema: {0}")]
    InvalidSchema(String),
}

impl GatewayError {
    /// JSON-RPC error code for this failure kind.
    ///
    /// Standard codes use the reserved JSON-RPC 2.0 values; gateway-defined
    /// kinds live in the server range -32000..-32099.
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::InvalidRequest(_) => -32600,
            Self::InvalidParams(_) => -32602,
            Self::ToolExecutionFailed(_) => -32000,
            Self::UnknownTool(_) => -32001,
            Self::Unauthenticated => -32002,
            Self::Forbidden(_) => -32003,
            Self::RateLimited { .. } => -32005,
            Self::Timeout(_) => -32008,
            // Registration-time kinds never reach the wire; map to internal.
            Self::DuplicateTool(_) | Self::InvalidSchema(_) => -32603,
        }
    }

    /// Nearest HTTP status for the REST surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidParams(_) => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden(_) => 403,
            Self::UnknownTool(_) => 404,
            Self::RateLimited { .. } => 429,
            Self::Timeout(_) => 504,
            Self::ToolExecutionFailed(_) | Self::DuplicateTool(_) | Self::InvalidSchema(_) => 500,
        }
    }

    /// Stable machine-readable kind tag used in REST error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidParams(_) => "invalid_params",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthenticated => "unauthenticated",
            Self::ToolExecutionFailed(_) => "tool_execution_failed",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Timeout(_) => "timeout",
            Self::DuplicateTool(_) => "duplicate_tool",
            Self::InvalidSchema(_) => "invalid_schema",
        }
    }
}
