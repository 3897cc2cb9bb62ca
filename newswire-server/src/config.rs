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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Newswire Gateway Configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub server: HttpServerConfig,
    #[serde(default)]
    pub protocols: ProtocolConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP listen address shared by the JSON-RPC, WebSocket, and REST
    /// surfaces (e.g., "127.0.0.1:47800")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Per-invocation tool timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Grace period for in-flight requests during shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// WebSocket heartbeat interval in seconds
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all, use specific origins in production)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Which protocol adapters the orchestrator starts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub stdio: bool,

    #[serde(default = "default_true")]
    pub http_rpc: bool,

    #[serde(default = "default_true")]
    pub websocket: bool,

    #[serde(default = "default_true")]
    pub rest: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stdio: false,
            http_rpc: true,
            websocket: true,
            rest: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Reject unauthenticated requests instead of granting read-only access
    #[serde(default)]
    pub required: bool,

    /// HMAC secret for bearer token verification (min 32 characters)
    pub signing_secret: Option<String>,

    /// Static API keys seeded at startup (format: "label:secret:perm|perm")
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            required: false,
            signing_secret: None,
            api_keys: vec![],
        }
    }
}

/// Algorithm, window, and ceiling for one rate-limit layer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLayerConfig {
    /// Window algorithm: "fixed" or "sliding"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests allowed per key per window
    pub limit: u32,
}

impl RateLayerConfig {
    pub fn fixed(window_secs: u64, limit: u32) -> Self {
        Self {
            algorithm: default_algorithm(),
            window_secs,
            limit,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting across all protocol surfaces
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-caller ceiling across all of a caller's traffic; a coarse
    /// window catching sustained abuse the tighter layers miss
    #[serde(default = "default_global_layer")]
    pub global: RateLayerConfig,

    /// Per-caller ceiling for each route class
    #[serde(default = "default_route_layer")]
    pub routes: RateLayerConfig,

    /// Per-caller ceiling for each protocol surface
    #[serde(default = "default_protocol_layer")]
    pub protocols: RateLayerConfig,

    /// Per-caller ceiling for each individual tool
    #[serde(default = "default_tool_layer")]
    pub tools: RateLayerConfig,

    /// Per-tool ceilings overriding `tools.limit` (same algorithm and
    /// window as the tools layer)
    #[serde(default)]
    pub tool_overrides: HashMap<String, u32>,

    /// Idle-entry sweep interval in seconds
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global: default_global_layer(),
            routes: default_route_layer(),
            protocols: default_protocol_layer(),
            tools: default_tool_layer(),
            tool_overrides: HashMap::new(),
            sweep_interval_secs: default_sweep_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Every layer with its name, for validation and diagnostics.
    pub fn layers(&self) -> [(&'static str, &RateLayerConfig); 4] {
        [
            ("global", &self.global),
            ("routes", &self.routes),
            ("protocols", &self.protocols),
            ("tools", &self.tools),
        ]
    }

    /// Apply one algorithm to every layer (env override).
    fn set_algorithm(&mut self, algorithm: &str) {
        self.global.algorithm = algorithm.to_string();
        self.routes.algorithm = algorithm.to_string();
        self.protocols.algorithm = algorithm.to_string();
        self.tools.algorithm = algorithm.to_string();
    }
}

// Default values
fn default_http_addr() -> String {
    "127.0.0.1:47800".to_string()
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_heartbeat() -> u64 {
    30
}

fn default_enable_cors() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_algorithm() -> String {
    "fixed".to_string()
}

fn default_global_layer() -> RateLayerConfig {
    RateLayerConfig::fixed(900, 2000)
}

fn default_route_layer() -> RateLayerConfig {
    RateLayerConfig::fixed(60, 300)
}

fn default_protocol_layer() -> RateLayerConfig {
    RateLayerConfig::fixed(60, 600)
}

fn default_tool_layer() -> RateLayerConfig {
    RateLayerConfig::fixed(60, 60)
}

fn default_window_secs() -> u64 {
    60
}

fn default_sweep_secs() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: HttpServerConfig {
                listen_addr: default_http_addr(),
                tool_timeout_secs: default_tool_timeout(),
                shutdown_grace_secs: default_shutdown_grace(),
                heartbeat_interval_secs: default_heartbeat(),
                enable_cors: default_enable_cors(),
                cors_origins: vec![],
            },
            protocols: ProtocolConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - NEWSWIRE_HTTP_ADDR: HTTP listen address (default: 127.0.0.1:47800)
    /// - NEWSWIRE_TOOL_TIMEOUT: Tool timeout in seconds (default: 30)
    /// - NEWSWIRE_AUTH_REQUIRED: Reject unauthenticated requests (default: false)
    /// - NEWSWIRE_SIGNING_SECRET: HMAC secret for bearer tokens
    /// - NEWSWIRE_API_KEYS: Comma-separated keys (format: label:secret:perm|perm)
    /// - NEWSWIRE_ENABLE_CORS: Enable CORS (default: true)
    /// - NEWSWIRE_RATE_LIMIT_ENABLED: Enable rate limiting (default: true)
    /// - NEWSWIRE_RATE_ALGORITHM: "fixed" or "sliding", applied to every
    ///   layer (default: fixed)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("NEWSWIRE_HTTP_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(timeout) = std::env::var("NEWSWIRE_TOOL_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                config.server.tool_timeout_secs = val;
            }
        }

        if let Ok(cors) = std::env::var("NEWSWIRE_ENABLE_CORS") {
            config.server.enable_cors = cors.parse().unwrap_or(true);
        }

        if let Ok(required) = std::env::var("NEWSWIRE_AUTH_REQUIRED") {
            config.auth.required = required.parse().unwrap_or(false);
        }

        if let Ok(secret) = std::env::var("NEWSWIRE_SIGNING_SECRET") {
            config.auth.signing_secret = Some(secret);
        }

        if let Ok(keys) = std::env::var("NEWSWIRE_API_KEYS") {
            config.auth.api_keys = keys.split(',').map(String::from).collect();
        }

        if let Ok(enabled) = std::env::var("NEWSWIRE_RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = enabled.parse().unwrap_or(true);
        }

        if let Ok(algorithm) = std::env::var("NEWSWIRE_RATE_ALGORITHM") {
            config.rate_limit.set_algorithm(&algorithm);
        }

        config
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config = Self::merge_with_env(config);

        Ok(config)
    }

    /// Merge config with environment variables (env takes priority)
    fn merge_with_env(mut config: Self) -> Self {
        let env_config = Self::from_env();

        if std::env::var("NEWSWIRE_HTTP_ADDR").is_ok() {
            config.server.listen_addr = env_config.server.listen_addr;
        }
        if std::env::var("NEWSWIRE_TOOL_TIMEOUT").is_ok() {
            config.server.tool_timeout_secs = env_config.server.tool_timeout_secs;
        }
        if std::env::var("NEWSWIRE_AUTH_REQUIRED").is_ok() {
            config.auth.required = env_config.auth.required;
        }
        if std::env::var("NEWSWIRE_SIGNING_SECRET").is_ok() {
            config.auth.signing_secret = env_config.auth.signing_secret;
        }
        if std::env::var("NEWSWIRE_API_KEYS").is_ok() {
            config.auth.api_keys = env_config.auth.api_keys;
        }
        if std::env::var("NEWSWIRE_RATE_LIMIT_ENABLED").is_ok() {
            config.rate_limit.enabled = env_config.rate_limit.enabled;
        }
        if let Ok(algorithm) = std::env::var("NEWSWIRE_RATE_ALGORITHM") {
            config.rate_limit.set_algorithm(&algorithm);
        }

        config
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration. Failures here abort startup.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if let Some(secret) = &self.auth.signing_secret {
            if secret.len() < 32 {
                anyhow::bail!("signing_secret must be at least 32 characters");
            }
        }

        if self.auth.required && self.auth.signing_secret.is_none() && self.auth.api_keys.is_empty()
        {
            anyhow::bail!(
                "Authentication required but no signing secret or API keys configured"
            );
        }

        for entry in &self.auth.api_keys {
            if entry.splitn(3, ':').count() != 3 {
                anyhow::bail!("Invalid api_keys entry (expected label:secret:perm|perm): {entry}");
            }
        }

        for (name, layer) in self.rate_limit.layers() {
            match layer.algorithm.as_str() {
                "fixed" | "sliding" => {}
                other => anyhow::bail!("Unknown rate limit algorithm for {name}: {other}"),
            }
            if layer.window_secs == 0 {
                anyhow::bail!("rate_limit.{name}.window_secs must be non-zero");
            }
            if layer.limit == 0 {
                anyhow::bail!("rate_limit.{name}.limit must be non-zero");
            }
        }

        for (tool, limit) in &self.rate_limit.tool_overrides {
            if *limit == 0 {
                anyhow::bail!("rate_limit.tool_overrides.{tool} must be non-zero");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1:47800");
        assert!(!config.auth.required);
        assert!(config.protocols.rest);
        assert!(!config.protocols.stdio);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = GatewayConfig::default();
        config.auth.signing_secret = Some("too-short".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_required_auth_needs_credentials() {
        let mut config = GatewayConfig::default();
        config.auth.required = true;
        assert!(config.validate().is_err());

        config.auth.api_keys = vec!["ci:nw_secret:read|write".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_key_entry_rejected() {
        let mut config = GatewayConfig::default();
        config.auth.api_keys = vec!["just-a-secret".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.tools.algorithm = "leaky".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_layer_limit_rejected() {
        let mut config = GatewayConfig::default();
        config.rate_limit.global.limit = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rate_limit.tool_overrides.insert("search".into(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            listen_addr = "0.0.0.0:8080"

            [protocols]
            stdio = true
            rest = false

            [rate_limit.tools]
            algorithm = "sliding"
            limit = 2

            [rate_limit.tool_overrides]
            search = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.protocols.stdio);
        assert!(!config.protocols.rest);
        // Unspecified layers keep their defaults.
        assert_eq!(config.rate_limit.global.algorithm, "fixed");
        assert_eq!(config.rate_limit.global.window_secs, 900);
        assert_eq!(config.rate_limit.tools.algorithm, "sliding");
        assert_eq!(config.rate_limit.tools.window_secs, 60);
        assert_eq!(config.rate_limit.tools.limit, 2);
        assert_eq!(config.rate_limit.tool_overrides["search"], 5);
    }
}
