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

//! WebSocket connection tracking
//!
//! Each live socket is one [`Connection`] moving through a fixed state
//! machine. Subscriptions and liveness exist only in `Open`; leaving
//! `Open` discards both, and a `Closed` connection receives nothing.

use crate::protocol::{WsEnvelope, WsKind};
use newswire_core::{Identity, Permission};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Authenticated,
    Open,
    Closing,
    Closed,
}

impl ConnState {
    fn can_advance_to(self, next: ConnState) -> bool {
        matches!(
            (self, next),
            (ConnState::Connecting, ConnState::Authenticated)
                | (ConnState::Authenticated, ConnState::Open)
                | (ConnState::Open, ConnState::Closing)
                | (ConnState::Closing, ConnState::Closed)
                // Abrupt disconnect at any pre-close stage.
                | (ConnState::Connecting, ConnState::Closed)
                | (ConnState::Authenticated, ConnState::Closed)
                | (ConnState::Open, ConnState::Closed)
        )
    }
}

/// One live WebSocket connection.
pub struct Connection {
    pub id: Uuid,
    tx: mpsc::UnboundedSender<String>,
    state: RwLock<ConnState>,
    /// Cleared each heartbeat cycle; a pong sets it again.
    alive: AtomicBool,
    /// Signaled when the manager force-closes the connection; the socket
    /// task selects on this to tear down the transport.
    closed: Notify,
    subscriptions: RwLock<HashSet<String>>,
    pub identity: Option<Identity>,
    pub permissions: HashSet<Permission>,
    /// Identity key used for rate-limit accounting.
    pub rate_key: String,
}

impl Connection {
    pub fn new(
        tx: mpsc::UnboundedSender<String>,
        identity: Option<Identity>,
        permissions: HashSet<Permission>,
        rate_key: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            state: RwLock::new(ConnState::Connecting),
            alive: AtomicBool::new(true),
            closed: Notify::new(),
            subscriptions: RwLock::new(HashSet::new()),
            identity,
            permissions,
            rate_key,
        }
    }

    pub fn state(&self) -> ConnState {
        *self.state.read()
    }

    /// Move to `next`, rejecting illegal transitions. Leaving `Open`
    /// drops subscriptions and liveness.
    pub fn advance(&self, next: ConnState) -> bool {
        let mut state = self.state.write();
        if !state.can_advance_to(next) {
            return false;
        }
        if *state == ConnState::Open && next != ConnState::Open {
            self.subscriptions.write().clear();
            self.alive.store(false, Ordering::SeqCst);
        }
        *state = next;
        true
    }

    /// Queue an outbound frame. Silently dropped unless the connection
    /// is `Open`.
    pub fn send(&self, frame: String) -> bool {
        if self.state() != ConnState::Open {
            return false;
        }
        self.tx.send(frame).is_ok()
    }

    /// Resolves once the manager has closed this connection. The permit
    /// is stored, so a waiter arriving after the close still resolves.
    pub async fn wait_closed(&self) {
        self.closed.notified().await;
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn clear_alive(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn subscribe(&self, topic: impl Into<String>) {
        if self.state() == ConnState::Open {
            self.subscriptions.write().insert(topic.into());
        }
    }

    pub fn unsubscribe(&self, topic: &str) {
        self.subscriptions.write().remove(topic);
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.read().contains(topic)
    }
}

/// Registry of live connections shared by the WebSocket adapter and the
/// heartbeat task.
#[derive(Default)]
pub struct ConnectionManager {
    connections: dashmap::DashMap<Uuid, Arc<Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id, conn);
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, conn)| {
            conn.advance(ConnState::Closed);
            conn.closed.notify_one();
            conn
        })
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// One heartbeat pass: evict every `Open` connection whose liveness
    /// flag was not refreshed since the previous pass, then clear the
    /// flag on survivors and ping them. Returns the evicted ids.
    pub fn heartbeat_cycle(&self) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self
            .connections
            .iter()
            .filter(|entry| entry.state() == ConnState::Open && !entry.is_alive())
            .map(|entry| entry.id)
            .collect();

        for id in &stale {
            if let Some(conn) = self.remove(id) {
                tracing::info!(connection_id = %conn.id, "evicting unresponsive connection");
            }
        }

        let ping = serde_json::to_string(&WsEnvelope::new(WsKind::Ping)).unwrap_or_default();
        for entry in self.connections.iter() {
            if entry.state() == ConnState::Open {
                entry.clear_alive();
                entry.send(ping.clone());
            }
        }

        stale
    }

    /// Deliver an envelope to every `Open` connection.
    pub fn broadcast(&self, envelope: &WsEnvelope) -> usize {
        let frame = match serde_json::to_string(envelope) {
            Ok(f) => f,
            Err(_) => return 0,
        };
        self.connections
            .iter()
            .filter(|entry| entry.send(frame.clone()))
            .count()
    }

    /// Deliver an envelope only to connections subscribed to `topic`.
    pub fn broadcast_to_subscribers(&self, topic: &str, envelope: &WsEnvelope) -> usize {
        let frame = match serde_json::to_string(envelope) {
            Ok(f) => f,
            Err(_) => return 0,
        };
        self.connections
            .iter()
            .filter(|entry| entry.is_subscribed(topic) && entry.send(frame.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(tx, None, Permission::read_only(), "addr:t".into()));
        conn.advance(ConnState::Authenticated);
        conn.advance(ConnState::Open);
        (conn, rx)
    }

    #[test]
    fn test_state_machine_order() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx, None, Permission::read_only(), "addr:t".into());
        assert_eq!(conn.state(), ConnState::Connecting);
        // Cannot skip straight to Open.
        assert!(!conn.advance(ConnState::Open));
        assert!(conn.advance(ConnState::Authenticated));
        assert!(conn.advance(ConnState::Open));
        assert!(conn.advance(ConnState::Closing));
        assert!(conn.advance(ConnState::Closed));
        assert!(!conn.advance(ConnState::Open));
    }

    #[test]
    fn test_closed_receives_nothing() {
        let (conn, mut rx) = open_connection();
        assert!(conn.send("one".into()));
        conn.advance(ConnState::Closing);
        assert!(!conn.send("two".into()));
        assert_eq!(rx.try_recv().unwrap(), "one");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_leaving_open_drops_subscriptions() {
        let (conn, _rx) = open_connection();
        conn.subscribe("alerts");
        assert!(conn.is_subscribed("alerts"));
        conn.advance(ConnState::Closing);
        assert!(!conn.is_subscribed("alerts"));
    }

    #[test]
    fn test_heartbeat_evicts_after_one_missed_cycle() {
        let manager = ConnectionManager::new();
        let (responsive, _rx1) = open_connection();
        let (silent, _rx2) = open_connection();
        manager.register(responsive.clone());
        manager.register(silent.clone());

        // First pass: everyone was alive at registration, nobody evicted,
        // flags cleared and pings queued.
        assert!(manager.heartbeat_cycle().is_empty());

        // Only one connection pongs back.
        responsive.mark_alive();

        let evicted = manager.heartbeat_cycle();
        assert_eq!(evicted, vec![silent.id]);
        assert_eq!(manager.len(), 1);
        assert_eq!(silent.state(), ConnState::Closed);
    }

    #[test]
    fn test_eviction_signals_socket_shutdown() {
        use futures::FutureExt;

        let manager = ConnectionManager::new();
        let (conn, _rx) = open_connection();
        manager.register(conn.clone());
        assert!(conn.wait_closed().now_or_never().is_none());

        manager.heartbeat_cycle();
        let evicted = manager.heartbeat_cycle();
        assert_eq!(evicted, vec![conn.id]);

        // The stored permit wakes the socket task even though it was not
        // yet waiting when the eviction happened.
        assert!(conn.wait_closed().now_or_never().is_some());
    }

    #[test]
    fn test_broadcast_scopes() {
        let manager = ConnectionManager::new();
        let (a, mut rx_a) = open_connection();
        let (b, mut rx_b) = open_connection();
        manager.register(a.clone());
        manager.register(b.clone());
        a.subscribe("markets");

        let sent = manager.broadcast_to_subscribers(
            "markets",
            &WsEnvelope::new(WsKind::Event).with_topic("markets"),
        );
        assert_eq!(sent, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());

        assert_eq!(manager.broadcast(&WsEnvelope::new(WsKind::Event)), 2);
    }
}
