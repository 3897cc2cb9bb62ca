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

//! Tool Registry - registration, lookup, and the canonical invocation path
//!
//! The registry is built once during orchestrator startup and handed to
//! every adapter as an `Arc`; it is read-mostly for the process lifetime.
//! `invoke` is the single execution path shared by all four protocol
//! adapters:
//!
//! 1. unknown name        -> `UnknownTool`
//! 2. defaults + schema   -> `InvalidParams` (handler never called)
//! 3. permission check    -> `Forbidden` naming the missing permissions
//! 4. handler, bounded by the wall-clock timeout; handler errors and
//!    panics surface as `ToolExecutionFailed`, never raw.

use crate::context::CallerContext;
use crate::error::GatewayError;
use crate::tool::{ToolDefinition, ToolDescriptor};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog of invocable tools.
pub struct ToolRegistry {
    /// Definitions in registration order; `tools/list` order is stable.
    tools: RwLock<Vec<ToolDefinition>>,
    /// Name -> index into `tools`.
    index: RwLock<HashMap<String, usize>>,
    /// Wall-clock bound applied to every handler invocation.
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(tool_timeout: Duration) -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
            index: RwLock::new(HashMap::new()),
            tool_timeout,
        }
    }

    /// Register a tool. Fails with `DuplicateTool` if the name exists.
    pub fn register(&self, tool: ToolDefinition) -> Result<(), GatewayError> {
        let mut index = self.index.write();
        if index.contains_key(&tool.name) {
            return Err(GatewayError::DuplicateTool(tool.name.clone()));
        }
        let mut tools = self.tools.write();
        index.insert(tool.name.clone(), tools.len());
        tools.push(tool);
        Ok(())
    }

    /// Tool metadata in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.read().iter().map(ToolDefinition::descriptor).collect()
    }

    pub fn get(&self, name: &str) -> Option<ToolDefinition> {
        let index = self.index.read();
        let pos = *index.get(name)?;
        self.tools.read().get(pos).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Canonical invocation path used by every adapter.
    pub async fn invoke(
        &self,
        name: &str,
        mut raw_params: Value,
        ctx: CallerContext,
    ) -> Result<String, GatewayError> {
        let tool = self
            .get(name)
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;

        tool.schema.apply_defaults(&mut raw_params);
        tool.schema.validate(&raw_params)?;

        let missing: Vec<&str> = tool
            .required_permissions
            .iter()
            .filter(|p| !ctx.permissions.contains(*p))
            .map(|p| p.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(GatewayError::Forbidden(missing.join(", ")));
        }

        let correlation_id = ctx.correlation_id;
        let handler = tool.handler.clone();
        // Run on a separate task so a panicking handler is contained as a
        // JoinError instead of unwinding through the adapter.
        let mut handle = tokio::spawn(async move { handler.call(raw_params, ctx).await });

        match tokio::time::timeout(self.tool_timeout, &mut handle).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(err))) => {
                tracing::warn!(tool = %name, correlation_id = %correlation_id, error = %err, "tool handler failed");
                match err {
                    // Handlers may surface structured gateway failures
                    // (e.g. a nested Forbidden); keep the kind.
                    e @ (GatewayError::Forbidden(_) | GatewayError::InvalidParams(_)) => Err(e),
                    other => Err(GatewayError::ToolExecutionFailed(other.to_string())),
                }
            }
            Ok(Err(join_err)) => {
                tracing::error!(tool = %name, correlation_id = %correlation_id, "tool handler panicked");
                Err(GatewayError::ToolExecutionFailed(format!(
                    "handler aborted: {join_err}"
                )))
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(tool = %name, correlation_id = %correlation_id, "tool invocation timed out");
                Err(GatewayError::Timeout(self.tool_timeout.as_millis() as u64))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}
