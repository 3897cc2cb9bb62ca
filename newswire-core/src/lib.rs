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

//! Newswire gateway core
//!
//! Protocol-independent building blocks shared by every adapter: the tool
//! registry with its single invocation path, caller identity and
//! permissions, parameter schemas, structured failure kinds, and the API
//! key store. Nothing in this crate knows about HTTP, WebSockets, or
//! stdio framing.

pub mod context;
pub mod error;
pub mod keys;
pub mod registry;
pub mod schema;
pub mod tool;

pub use context::{
    require_all, require_any, require_permission, CallerContext, Identity, Permission,
    ProgressUpdate, Protocol,
};
pub use error::GatewayError;
pub use keys::{ApiKeyInfo, ApiKeyRecord, ApiKeyStore, IssuedKey};
pub use registry::ToolRegistry;
pub use schema::ParamSchema;
pub use tool::{ToolDefinition, ToolDescriptor, ToolHandler};
