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

//! WebSocket surface
//!
//! Full-duplex JSON-RPC plus the event envelope from `protocol.rs`.
//! Frames carrying a `jsonrpc` member are RPC traffic; everything else
//! is an envelope (ping, pong, subscribe, unsubscribe). All outbound
//! frames for one connection flow through a single ordered channel, so
//! progress frames always precede their terminal response.

use crate::auth::{resolve_credentials, AuthError};
use crate::connection::{ConnState, Connection};
use crate::protocol::{
    JsonRpcError, JsonRpcId, JsonRpcResponse, WsEnvelope, WsKind,
};
use crate::GatewayState;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{HeaderMap, Uri},
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use newswire_core::{CallerContext, ProgressUpdate, Protocol};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct WsAdapter {
    state: Arc<GatewayState>,
}

impl WsAdapter {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }
}

async fn ws_handler(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    // Credentials come from headers or, for browser clients, the query
    // string. The decision is made before the upgrade completes; a
    // failed required-mode handshake still upgrades so the close frame
    // can carry the policy violation code.
    let auth = resolve_credentials(state.authenticator.as_ref(), &headers, &uri);
    let client_ip = crate::auth::extract_client_ip(&headers);
    ws.on_upgrade(move |socket| handle_socket(state, socket, auth, client_ip))
}

async fn handle_socket(
    state: Arc<GatewayState>,
    mut socket: WebSocket,
    auth: Result<crate::auth::AuthContext, AuthError>,
    client_ip: Option<String>,
) {
    let auth = match auth {
        Ok(ctx) => ctx,
        Err(AuthError::MissingCredentials) if !state.config.auth.required => {
            crate::auth::AuthContext::anonymous()
        }
        Err(err) => {
            tracing::info!(error = %err, "closing websocket handshake");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "authentication required".into(),
                })))
                .await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let rate_key = auth
        .identity
        .as_ref()
        .map(|i| i.rate_key())
        .or_else(|| client_ip.map(|ip| format!("addr:{ip}")))
        .unwrap_or_else(|| "addr:unknown".to_string());
    let conn = Arc::new(Connection::new(
        tx,
        auth.identity.clone(),
        auth.permissions.clone(),
        rate_key,
    ));
    conn.advance(ConnState::Authenticated);
    conn.advance(ConnState::Open);
    state.connections.register(conn.clone());
    tracing::info!(connection_id = %conn.id, "websocket connection open");

    conn.send(
        serde_json::to_string(
            &WsEnvelope::new(WsKind::Welcome)
                .with_data(json!({ "connectionId": conn.id.to_string() })),
        )
        .unwrap_or_default(),
    );

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &conn, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => conn.mark_alive(),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Binary(_))) => {}
                }
            }
            // Heartbeat eviction must tear down the transport even when
            // the peer never sends another frame.
            _ = conn.wait_closed() => break,
        }
        if conn.state() != ConnState::Open {
            break;
        }
    }

    conn.advance(ConnState::Closing);
    state.connections.remove(&conn.id);
    writer.abort();
    tracing::info!(connection_id = %conn.id, "websocket connection closed");
}

async fn handle_frame(state: &Arc<GatewayState>, conn: &Arc<Connection>, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            send_rpc(
                conn,
                &JsonRpcResponse::error(
                    JsonRpcId::Null,
                    JsonRpcError::parse_error(format!("Invalid JSON: {e}")),
                ),
            );
            return;
        }
    };

    if value.get("jsonrpc").is_some() {
        handle_rpc_frame(state, conn, value).await;
    } else {
        handle_envelope_frame(conn, value);
    }
}

async fn handle_rpc_frame(
    state: &Arc<GatewayState>,
    conn: &Arc<Connection>,
    value: serde_json::Value,
) {
    let id: JsonRpcId = value
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let tool = value
        .pointer("/params/name")
        .and_then(|n| n.as_str())
        .filter(|_| value.get("method").and_then(|m| m.as_str()) == Some("tools/call"))
        .map(str::to_string);

    if let Err(err) = state.limiter.check_request(
        &conn.rate_key,
        Protocol::WebSocket,
        "ws",
        tool.as_deref(),
    ) {
        send_rpc(conn, &JsonRpcResponse::error(id, JsonRpcError::from_gateway(&err)));
        return;
    }

    let mut ctx = CallerContext::new(
        Protocol::WebSocket,
        conn.identity.clone(),
        conn.permissions.clone(),
    );

    // Streaming calls get a progress sink; stages the handler reports
    // are forwarded as progress envelopes through the shared outbound
    // channel, which keeps them ahead of the terminal response.
    let streaming = tool.is_some()
        && value
            .pointer("/params/stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(false);
    let forwarder = if streaming {
        send_envelope(
            conn,
            &WsEnvelope::new(WsKind::Progress)
                .with_id(id.clone())
                .with_data(json!({ "stage": "accepted" })),
        );
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        ctx = ctx.with_progress(progress_tx);
        let progress_conn = conn.clone();
        let progress_id = id.clone();
        Some(tokio::spawn(async move {
            while let Some(update) = progress_rx.recv().await {
                send_envelope(
                    &progress_conn,
                    &WsEnvelope::new(WsKind::Progress)
                        .with_id(progress_id.clone())
                        .with_data(json!({ "stage": update.stage })),
                );
            }
        }))
    } else {
        None
    };

    let response = state.dispatcher.dispatch_value(value, ctx).await;
    // Dispatch consumed the context, so the sink is gone and the
    // forwarder drains; join it before the terminal response.
    if let Some(task) = forwarder {
        let _ = task.await;
    }
    send_rpc(conn, &response);
}

fn handle_envelope_frame(conn: &Arc<Connection>, value: serde_json::Value) {
    let envelope: WsEnvelope = match serde_json::from_value(value) {
        Ok(e) => e,
        Err(e) => {
            send_envelope(
                conn,
                &WsEnvelope::new(WsKind::Error)
                    .with_data(json!({ "message": format!("Unrecognized frame: {e}") })),
            );
            return;
        }
    };

    match envelope.kind {
        WsKind::Ping => {
            send_envelope(conn, &WsEnvelope::new(WsKind::Pong));
        }
        WsKind::Pong => conn.mark_alive(),
        WsKind::Subscribe => match envelope.topic {
            Some(topic) => {
                conn.subscribe(topic.clone());
                send_envelope(conn, &WsEnvelope::new(WsKind::Subscribed).with_topic(topic));
            }
            None => send_envelope(
                conn,
                &WsEnvelope::new(WsKind::Error)
                    .with_data(json!({ "message": "subscribe requires a topic" })),
            ),
        },
        WsKind::Unsubscribe => {
            if let Some(topic) = envelope.topic {
                conn.unsubscribe(&topic);
                send_envelope(conn, &WsEnvelope::new(WsKind::Unsubscribed).with_topic(topic));
            }
        }
        other => {
            send_envelope(
                conn,
                &WsEnvelope::new(WsKind::Error)
                    .with_data(json!({ "message": format!("Unexpected frame kind: {other:?}") })),
            );
        }
    }
}

fn send_rpc(conn: &Arc<Connection>, response: &JsonRpcResponse) {
    if let Ok(frame) = serde_json::to_string(response) {
        conn.send(frame);
    }
}

fn send_envelope(conn: &Arc<Connection>, envelope: &WsEnvelope) {
    if let Ok(frame) = serde_json::to_string(envelope) {
        conn.send(frame);
    }
}
