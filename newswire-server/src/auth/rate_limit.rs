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

//! Layered rate limiting
//!
//! Four layers are consulted in order: global, route class, protocol, and
//! per-tool. Every layer keys its counters by caller identity, so one
//! caller exhausting a budget never starves another. Each layer carries
//! its own algorithm, window, and ceiling; individual tools may override
//! the tools-layer ceiling. The first layer that rejects wins; its retry
//! hint is carried in the error. Counters are reclaimed by a periodic
//! sweep rather than per-entry timers.

use crate::config::{RateLayerConfig, RateLimitConfig};
use dashmap::DashMap;
use newswire_core::{GatewayError, Protocol};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Window accounting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Counter resets at fixed window boundaries.
    Fixed,
    /// Rolling log of request timestamps.
    Sliding,
}

impl WindowKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "sliding" => Some(Self::Sliding),
            _ => None,
        }
    }
}

/// Per-key window state.
#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
    /// Timestamps within the window; only populated for sliding windows.
    timestamps: VecDeque<Instant>,
    last_seen: Instant,
}

/// Outcome of a single layer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// One rate-limit layer: a limit, a window, and a keyed counter arena.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    kind: WindowKind,
    entries: DashMap<String, RateWindow>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, kind: WindowKind) -> Self {
        Self {
            limit,
            window,
            kind,
            entries: DashMap::new(),
        }
    }

    /// Record one request against `key` and decide.
    pub fn check(&self, key: &str) -> RateDecision {
        self.check_with_limit(key, self.limit)
    }

    /// Like [`check`](Self::check) with a per-key ceiling in place of the
    /// layer default.
    pub fn check_with_limit(&self, key: &str, limit: u32) -> RateDecision {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| RateWindow {
            window_start: now,
            count: 0,
            timestamps: VecDeque::new(),
            last_seen: now,
        });
        entry.last_seen = now;

        match self.kind {
            WindowKind::Fixed => {
                if now.duration_since(entry.window_start) >= self.window {
                    entry.window_start = now;
                    entry.count = 0;
                }
                if entry.count >= limit {
                    let retry_after = self
                        .window
                        .saturating_sub(now.duration_since(entry.window_start));
                    return RateDecision::Limited { retry_after };
                }
                entry.count += 1;
                RateDecision::Allowed {
                    remaining: limit - entry.count,
                }
            }
            WindowKind::Sliding => {
                while let Some(front) = entry.timestamps.front() {
                    if now.duration_since(*front) >= self.window {
                        entry.timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if entry.timestamps.len() as u32 >= limit {
                    let retry_after = entry
                        .timestamps
                        .front()
                        .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                        .unwrap_or(self.window);
                    return RateDecision::Limited { retry_after };
                }
                entry.timestamps.push_back(now);
                RateDecision::Allowed {
                    remaining: limit - entry.timestamps.len() as u32,
                }
            }
        }
    }

    /// Drop entries idle for longer than one full window.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.duration_since(w.last_seen) < self.window);
        before - self.entries.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}

/// All four layers behind one check.
pub struct LayeredRateLimiter {
    enabled: bool,
    global: RateLimiter,
    routes: RateLimiter,
    protocols: RateLimiter,
    tools: RateLimiter,
    tool_overrides: std::collections::HashMap<String, u32>,
}

fn layer_limiter(layer: &RateLayerConfig) -> RateLimiter {
    RateLimiter::new(
        layer.limit,
        Duration::from_secs(layer.window_secs),
        WindowKind::parse(&layer.algorithm).unwrap_or(WindowKind::Fixed),
    )
}

impl LayeredRateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            global: layer_limiter(&config.global),
            routes: layer_limiter(&config.routes),
            protocols: layer_limiter(&config.protocols),
            tools: layer_limiter(&config.tools),
            tool_overrides: config.tool_overrides.clone(),
        }
    }

    /// Check every applicable layer for one request.
    ///
    /// `caller` is the identity key (api key id, token subject, or address
    /// fallback); each layer scopes its counters to it. Returns the
    /// smallest remaining allowance across layers, for response headers.
    pub fn check_request(
        &self,
        caller: &str,
        protocol: Protocol,
        route_class: &str,
        tool: Option<&str>,
    ) -> Result<u32, GatewayError> {
        if !self.enabled {
            return Ok(u32::MAX);
        }

        let mut min_remaining = u32::MAX;
        let checks = [
            self.global.check(caller),
            self.routes.check(&format!("{route_class}:{caller}")),
            self.protocols.check(&format!("{}:{caller}", protocol.as_str())),
        ];
        for decision in checks {
            match decision {
                RateDecision::Allowed { remaining } => min_remaining = min_remaining.min(remaining),
                RateDecision::Limited { retry_after } => {
                    return Err(rate_limited(retry_after));
                }
            }
        }

        if let Some(tool) = tool {
            match self.tool_decision(caller, tool) {
                RateDecision::Allowed { remaining } => min_remaining = min_remaining.min(remaining),
                RateDecision::Limited { retry_after } => {
                    return Err(rate_limited(retry_after));
                }
            }
        }

        Ok(min_remaining)
    }

    /// Check only the per-tool layer, for batch entries whose outer
    /// request already passed the route layers.
    pub fn check_tool(&self, caller: &str, tool: &str) -> Result<u32, GatewayError> {
        if !self.enabled {
            return Ok(u32::MAX);
        }
        match self.tool_decision(caller, tool) {
            RateDecision::Allowed { remaining } => Ok(remaining),
            RateDecision::Limited { retry_after } => Err(rate_limited(retry_after)),
        }
    }

    fn tool_decision(&self, caller: &str, tool: &str) -> RateDecision {
        let limit = self
            .tool_overrides
            .get(tool)
            .copied()
            .unwrap_or(self.tools.limit);
        self.tools.check_with_limit(&format!("{tool}:{caller}"), limit)
    }

    /// Reclaim idle counters across every layer.
    pub fn sweep(&self) -> usize {
        self.global.sweep() + self.routes.sweep() + self.protocols.sweep() + self.tools.sweep()
    }
}

fn rate_limited(retry_after: Duration) -> GatewayError {
    // Round up so a caller that waits the advertised time lands outside
    // the window.
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    GatewayError::RateLimited {
        retry_after_secs: secs.max(1),
        remaining: 0,
    }
}

/// Extract client IP from forwarding headers.
pub fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return Some(ip.to_string());
            }
        }
    }
    headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(algorithm: &str, window_secs: u64, limit: u32) -> RateLayerConfig {
        RateLayerConfig {
            algorithm: algorithm.to_string(),
            window_secs,
            limit,
        }
    }

    fn small_config(tool_limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            global: layer("fixed", 60, 1000),
            routes: layer("fixed", 60, 100),
            protocols: layer("fixed", 60, 100),
            tools: layer("fixed", 60, tool_limit),
            tool_overrides: std::collections::HashMap::new(),
            sweep_interval_secs: 120,
        }
    }

    #[test]
    fn test_fixed_window_boundary() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), WindowKind::Fixed);
        for expected_remaining in [2, 1, 0] {
            assert_eq!(
                limiter.check("c1"),
                RateDecision::Allowed { remaining: expected_remaining }
            );
        }
        match limiter.check("c1") {
            RateDecision::Limited { retry_after } => {
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected limited, got {other:?}"),
        }
    }

    #[test]
    fn test_sliding_window_boundary() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50), WindowKind::Sliding);
        assert!(matches!(limiter.check("c1"), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("c1"), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("c1"), RateDecision::Limited { .. }));
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(limiter.check("c1"), RateDecision::Allowed { .. }));
    }

    #[test]
    fn test_keys_isolated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), WindowKind::Fixed);
        assert!(matches!(limiter.check("a"), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("b"), RateDecision::Allowed { .. }));
        assert!(matches!(limiter.check("a"), RateDecision::Limited { .. }));
    }

    #[test]
    fn test_tool_layer_trips_first() {
        let layered = LayeredRateLimiter::from_config(&small_config(2));
        for _ in 0..2 {
            layered
                .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
                .unwrap();
        }
        let err = layered
            .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
            .unwrap_err();
        match err {
            GatewayError::RateLimited { retry_after_secs, .. } => {
                assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        // A different tool under the same caller is still within budget.
        layered
            .check_request("key:k1", Protocol::Rest, "execute", Some("search"))
            .unwrap();
    }

    #[test]
    fn test_global_layer_keyed_by_caller() {
        let mut config = small_config(50);
        config.global = layer("fixed", 60, 2);
        let layered = LayeredRateLimiter::from_config(&config);

        for _ in 0..2 {
            layered
                .check_request("key:a", Protocol::Rest, "execute", None)
                .unwrap();
        }
        assert!(layered
            .check_request("key:a", Protocol::Rest, "execute", None)
            .is_err());

        // One caller burning its global budget leaves others untouched.
        assert!(layered
            .check_request("key:b", Protocol::Rest, "execute", None)
            .is_ok());
    }

    #[test]
    fn test_layers_keep_their_own_window_and_algorithm() {
        let mut config = small_config(1);
        config.tools = layer("sliding", 1, 1);
        let layered = LayeredRateLimiter::from_config(&config);

        layered
            .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
            .unwrap();
        assert!(layered
            .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
            .is_err());

        // The tools window rolls over on its own clock; the other layers
        // still count against their 60s windows.
        std::thread::sleep(Duration::from_millis(1100));
        layered
            .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
            .unwrap();
    }

    #[test]
    fn test_tool_override_ceiling() {
        let mut config = small_config(5);
        config.tool_overrides.insert("search".into(), 1);
        let layered = LayeredRateLimiter::from_config(&config);

        layered.check_tool("key:k1", "search").unwrap();
        assert!(layered.check_tool("key:k1", "search").is_err());

        // Tools without an override keep the layer default.
        for _ in 0..5 {
            layered.check_tool("key:k1", "headlines").unwrap();
        }
        assert!(layered.check_tool("key:k1", "headlines").is_err());
    }

    #[test]
    fn test_disabled_allows_everything() {
        let mut config = small_config(1);
        config.enabled = false;
        let layered = LayeredRateLimiter::from_config(&config);
        for _ in 0..10 {
            layered
                .check_request("key:k1", Protocol::Rest, "execute", Some("headlines"))
                .unwrap();
        }
    }

    #[test]
    fn test_sweep_reclaims_idle_entries() {
        let limiter = RateLimiter::new(5, Duration::from_millis(20), WindowKind::Fixed);
        limiter.check("a");
        limiter.check("b");
        assert_eq!(limiter.tracked_keys(), 2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.sweep(), 2);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_extract_client_ip() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("X-Forwarded-For", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip(&headers), Some("203.0.113.9".to_string()));

        let mut headers = axum::http::HeaderMap::new();
        headers.insert("X-Real-IP", "198.51.100.4".parse().unwrap());
        assert_eq!(extract_client_ip(&headers), Some("198.51.100.4".to_string()));

        assert_eq!(extract_client_ip(&axum::http::HeaderMap::new()), None);
    }
}
