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

//! Caller identity and permissions
//!
//! A [`CallerContext`] is created by a protocol adapter for each invocation
//! and discarded once the call completes. The correlation id ties log lines
//! and responses back to one invocation.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Entry point a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Stdio,
    HttpRpc,
    WebSocket,
    Rest,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::HttpRpc => "http-rpc",
            Self::WebSocket => "websocket",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability granted to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// The permission set granted when no credential resolves.
    pub fn read_only() -> HashSet<Permission> {
        HashSet::from([Permission::Read])
    }

    /// Every permission; used inside the process trust boundary (stdio).
    pub fn all() -> HashSet<Permission> {
        HashSet::from([Permission::Read, Permission::Write, Permission::Admin])
    }
}

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Identity {
    /// Matched an API key record.
    ApiKey { id: String, label: String },
    /// Subject claim from a verified bearer token.
    Subject(String),
}

impl Identity {
    /// Stable key for rate-limit accounting.
    pub fn rate_key(&self) -> String {
        match self {
            Self::ApiKey { id, .. } => format!("key:{id}"),
            Self::Subject(sub) => format!("sub:{sub}"),
        }
    }
}

/// Stage announcement emitted by a handler mid-invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub stage: String,
}

/// Per-invocation caller data attached by the adapter.
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub protocol: Protocol,
    pub identity: Option<Identity>,
    pub permissions: HashSet<Permission>,
    pub correlation_id: Uuid,
    /// Sink for handler-reported progress stages. Adapters that stream
    /// attach one; everyone else leaves it empty and reports are no-ops.
    progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl CallerContext {
    pub fn new(protocol: Protocol, identity: Option<Identity>, permissions: HashSet<Permission>) -> Self {
        Self {
            protocol,
            identity,
            permissions,
            correlation_id: Uuid::new_v4(),
            progress: None,
        }
    }

    /// Attach a progress sink for this invocation.
    pub fn with_progress(mut self, sink: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Announce a stage of a long-running invocation. Dropped receivers
    /// are ignored; reporting never fails the call.
    pub fn report_progress(&self, stage: impl Into<String>) {
        if let Some(sink) = &self.progress {
            let _ = sink.send(ProgressUpdate { stage: stage.into() });
        }
    }

    /// Anonymous caller with the default read-only permission set.
    pub fn anonymous(protocol: Protocol) -> Self {
        Self::new(protocol, None, Permission::read_only())
    }

    /// Fully-trusted caller; the pipe adapter's trust boundary is the
    /// hosting process itself.
    pub fn trusted(protocol: Protocol) -> Self {
        Self::new(protocol, None, Permission::all())
    }

    /// Identity key for rate-limit accounting, falling back to the
    /// caller's network address when unauthenticated.
    pub fn rate_identity(&self, fallback_addr: &str) -> String {
        self.identity
            .as_ref()
            .map(Identity::rate_key)
            .unwrap_or_else(|| format!("addr:{fallback_addr}"))
    }

    pub fn has_permission(&self, perm: Permission) -> bool {
        self.permissions.contains(&perm)
    }
}

/// Fails with [`GatewayError::Forbidden`] naming the missing permission.
pub fn require_permission(ctx: &CallerContext, perm: Permission) -> Result<(), GatewayError> {
    if ctx.has_permission(perm) {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(perm.as_str().to_string()))
    }
}

/// Fails unless the caller holds every listed permission.
pub fn require_all(ctx: &CallerContext, perms: &[Permission]) -> Result<(), GatewayError> {
    let missing: Vec<&str> = perms
        .iter()
        .filter(|p| !ctx.has_permission(**p))
        .map(|p| p.as_str())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::Forbidden(missing.join(", ")))
    }
}

/// Fails unless the caller holds at least one listed permission.
pub fn require_any(ctx: &CallerContext, perms: &[Permission]) -> Result<(), GatewayError> {
    if perms.iter().any(|p| ctx.has_permission(*p)) {
        Ok(())
    } else {
        let wanted: Vec<&str> = perms.iter().map(|p| p.as_str()).collect();
        Err(GatewayError::Forbidden(wanted.join(" | ")))
    }
}
