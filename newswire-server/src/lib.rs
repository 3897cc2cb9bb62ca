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

pub mod adapters;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod protocol;

use adapters::{HttpRpcAdapter, ProtocolAdapter, RestAdapter, StdioAdapter, WsAdapter};
use anyhow::Result;
use auth::{ApiKeyAuth, Authenticator, BearerTokenAuth, LayeredRateLimiter, MultiAuth};
use axum::Router;
use catalog::{default_catalog, NewsProvider, StaticNewsProvider};
use config::GatewayConfig;
use connection::ConnectionManager;
use dispatch::RpcDispatcher;
use newswire_core::{ApiKeyStore, Permission, ToolRegistry};
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Process-wide counters exposed on the operational endpoints.
pub struct Metrics {
    pub started_at: Instant,
    pub requests: AtomicU64,
    pub failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Everything the adapters share, assembled once at startup and handed
/// around as an `Arc`. No globals.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub registry: Arc<ToolRegistry>,
    pub dispatcher: Arc<RpcDispatcher>,
    pub key_store: Arc<ApiKeyStore>,
    pub authenticator: Arc<dyn Authenticator>,
    pub limiter: Arc<LayeredRateLimiter>,
    pub connections: Arc<ConnectionManager>,
    pub metrics: Metrics,
}

/// Build the shared state from a validated configuration.
pub fn build_state(
    config: GatewayConfig,
    provider: Arc<dyn NewsProvider>,
) -> Result<Arc<GatewayState>> {
    config.validate()?;

    let key_store = Arc::new(ApiKeyStore::new());
    for entry in &config.auth.api_keys {
        let mut parts = entry.splitn(3, ':');
        let (label, secret, perms) = match (parts.next(), parts.next(), parts.next()) {
            (Some(l), Some(s), Some(p)) => (l, s, p),
            _ => anyhow::bail!("Invalid api_keys entry: {entry}"),
        };
        let permissions: HashSet<Permission> =
            perms.split('|').filter_map(Permission::parse).collect();
        if permissions.is_empty() {
            anyhow::bail!("api_keys entry grants no recognized permissions: {entry}");
        }
        key_store.seed(label, secret, permissions);
        tracing::info!(label, "seeded API key from configuration");
    }

    let mut strategies: Vec<Arc<dyn Authenticator>> =
        vec![Arc::new(ApiKeyAuth::new(key_store.clone()))];
    if let Some(secret) = config.auth.signing_secret.clone() {
        tracing::info!("bearer token authentication enabled");
        strategies.push(Arc::new(BearerTokenAuth::new(secret)));
    }
    let authenticator: Arc<dyn Authenticator> = Arc::new(MultiAuth::new(strategies));

    let registry = Arc::new(default_catalog(
        provider,
        Duration::from_secs(config.server.tool_timeout_secs),
    ));
    let dispatcher = Arc::new(RpcDispatcher::new(registry.clone()));
    let limiter = Arc::new(LayeredRateLimiter::from_config(&config.rate_limit));
    let connections = Arc::new(ConnectionManager::new());

    Ok(Arc::new(GatewayState {
        config,
        registry,
        dispatcher,
        key_store,
        authenticator,
        limiter,
        connections,
        metrics: Metrics::default(),
    }))
}

/// Assemble the HTTP router from every enabled network adapter.
pub fn build_router(state: &Arc<GatewayState>, adapters: &[ProtocolAdapter]) -> Router {
    let mut app = Router::new();
    for adapter in adapters {
        if let Some(router) = adapter.router() {
            app = app.merge(router);
        }
    }

    let cors = if state.config.server.enable_cors {
        if state.config.server.cors_origins.is_empty() {
            tracing::warn!("CORS: allowing all origins; set cors_origins in production");
        }
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    app.layer(cors).layer(TraceLayer::new_for_http())
}

/// Build the adapter set for the enabled protocols.
pub fn build_adapters(state: &Arc<GatewayState>) -> Vec<ProtocolAdapter> {
    let mut adapters = Vec::new();
    if state.config.protocols.stdio {
        adapters.push(ProtocolAdapter::Stdio(StdioAdapter::new(
            state.dispatcher.clone(),
        )));
    }
    if state.config.protocols.http_rpc {
        adapters.push(ProtocolAdapter::HttpRpc(HttpRpcAdapter::new(state.clone())));
    }
    if state.config.protocols.websocket {
        adapters.push(ProtocolAdapter::WebSocket(WsAdapter::new(state.clone())));
    }
    if state.config.protocols.rest {
        adapters.push(ProtocolAdapter::Rest(RestAdapter::new(state.clone())));
    }
    adapters
}

pub async fn run_gateway(config: GatewayConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newswire_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Newswire Gateway");

    let state = build_state(config, Arc::new(StaticNewsProvider))?;
    let adapters = build_adapters(&state);
    for adapter in &adapters {
        tracing::info!(protocol = %adapter.protocol(), "protocol enabled");
    }

    // Background sweep keeps the rate-limit arena bounded.
    let sweep_state = state.clone();
    let sweep_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            sweep_state.config.rate_limit.sweep_interval_secs,
        ));
        loop {
            interval.tick().await;
            let reclaimed = sweep_state.limiter.sweep();
            if reclaimed > 0 {
                tracing::debug!(reclaimed, "swept idle rate-limit entries");
            }
        }
    });

    // Heartbeat pings every connection and evicts the unresponsive.
    let heartbeat_state = state.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(
            heartbeat_state.config.server.heartbeat_interval_secs,
        ));
        // First tick completes immediately; skip it so new connections
        // get a full interval before their first liveness check.
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = heartbeat_state.connections.heartbeat_cycle();
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "evicted unresponsive connections");
            }
        }
    });

    // The pipe transport runs beside the HTTP listener; its EOF is a
    // clean stop that leaves the network surfaces up.
    let stdio_task = if state.config.protocols.stdio {
        let dispatcher = state.dispatcher.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = StdioAdapter::new(dispatcher).run().await {
                tracing::error!("pipe transport error: {}", e);
            }
        }))
    } else {
        None
    };

    let app = build_router(&state, &adapters);
    let addr = state.config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    for adapter in &adapters {
        adapter.cleanup(&state).await;
    }
    sweep_task.abort();
    heartbeat_task.abort();
    if let Some(task) = stdio_task {
        task.abort();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}
