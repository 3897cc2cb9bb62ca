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

//! Protocol adapters
//!
//! The adapter set is a closed enum: every dispatch over it is an
//! exhaustive match, so adding a protocol is a compile-visible change
//! at every call site.

pub mod http_rpc;
pub mod rest;
pub mod stdio;
pub mod ws;

pub use http_rpc::HttpRpcAdapter;
pub use rest::RestAdapter;
pub use stdio::StdioAdapter;
pub use ws::WsAdapter;

use crate::protocol::{WsEnvelope, WsKind};
use crate::GatewayState;
use axum::Router;
use newswire_core::Protocol;
use serde_json::json;
use std::sync::Arc;

pub enum ProtocolAdapter {
    Stdio(StdioAdapter),
    HttpRpc(HttpRpcAdapter),
    WebSocket(WsAdapter),
    Rest(RestAdapter),
}

impl ProtocolAdapter {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Stdio(_) => Protocol::Stdio,
            Self::HttpRpc(_) => Protocol::HttpRpc,
            Self::WebSocket(_) => Protocol::WebSocket,
            Self::Rest(_) => Protocol::Rest,
        }
    }

    /// Routes contributed to the shared HTTP listener, if any.
    pub fn router(&self) -> Option<Router> {
        match self {
            Self::Stdio(_) => None,
            Self::HttpRpc(adapter) => Some(adapter.router()),
            Self::WebSocket(adapter) => Some(adapter.router()),
            Self::Rest(adapter) => Some(adapter.router()),
        }
    }

    /// Shutdown hook, called in registration order during graceful stop.
    pub async fn cleanup(&self, state: &Arc<GatewayState>) {
        match self {
            Self::Stdio(_) => {
                tracing::info!("pipe transport stopped");
            }
            Self::HttpRpc(_) => {
                tracing::info!("http-rpc surface stopped");
            }
            Self::WebSocket(_) => {
                let notified = state.connections.broadcast(
                    &WsEnvelope::new(WsKind::Event)
                        .with_topic("system")
                        .with_data(json!({ "event": "shutdown" })),
                );
                tracing::info!(notified, "websocket surface stopped");
            }
            Self::Rest(_) => {
                tracing::info!("rest surface stopped");
            }
        }
    }
}
