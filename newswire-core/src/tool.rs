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

//! Tool definitions and the handler contract
//!
//! A tool is a named, schema-validated operation. Handlers receive params
//! that already passed validation with defaults applied, may perform their
//! own I/O, and must not assume any particular adapter.

use crate::context::{CallerContext, Permission};
use crate::error::GatewayError;
use crate::schema::ParamSchema;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Boundary contract for tool implementations.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Value, ctx: CallerContext) -> Result<String, GatewayError>;
}

/// One entry in the tool catalog. Immutable after registration.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: ParamSchema,
    pub required_permissions: HashSet<Permission>,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Build a definition, compiling the parameter schema up front.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        required_permissions: impl IntoIterator<Item = Permission>,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            name: name.into(),
            description: description.into(),
            schema: ParamSchema::new(schema)?,
            required_permissions: required_permissions.into_iter().collect(),
            handler,
        })
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let mut perms: Vec<&'static str> = self
            .required_permissions
            .iter()
            .map(Permission::as_str)
            .collect();
        perms.sort_unstable();
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.schema.raw().clone(),
            required_permissions: perms,
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("required_permissions", &self.required_permissions)
            .finish()
    }
}

/// Serializable tool metadata for discovery surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(rename = "requiredPermissions")]
    pub required_permissions: Vec<&'static str>,
}
