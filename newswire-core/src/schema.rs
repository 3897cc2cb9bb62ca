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

//! Tool parameter schemas
//!
//! Each tool carries a JSON Schema compiled once at registration. The
//! gateway applies top-level property defaults before validating, so a
//! caller may omit any parameter that declares one.

use crate::error::GatewayError;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::Arc;

/// Compiled parameter schema for one tool.
#[derive(Clone)]
pub struct ParamSchema {
    raw: Value,
    compiled: Arc<JSONSchema>,
}

impl std::fmt::Debug for ParamSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSchema").field("raw", &self.raw).finish()
    }
}

impl ParamSchema {
    /// Compile a JSON Schema document. Fails at registration time, never
    /// per request.
    pub fn new(raw: Value) -> Result<Self, GatewayError> {
        let compiled = JSONSchema::compile(&raw)
            .map_err(|e| GatewayError::InvalidSchema(e.to_string()))?;
        Ok(Self { raw, compiled: Arc::new(compiled) })
    }

    /// The schema document as advertised by `tools/list`.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Fill in declared top-level defaults for missing properties.
    ///
    /// A null params value becomes an empty object first, so a tool whose
    /// parameters all default can be called with no arguments at all.
    pub fn apply_defaults(&self, params: &mut Value) {
        if params.is_null() {
            *params = Value::Object(serde_json::Map::new());
        }
        let Some(obj) = params.as_object_mut() else { return };
        let Some(props) = self.raw.get("properties").and_then(Value::as_object) else {
            return;
        };
        for (name, prop) in props {
            if obj.contains_key(name) {
                continue;
            }
            if let Some(default) = prop.get("default") {
                obj.insert(name.clone(), default.clone());
            }
        }
    }

    /// Validate params against the schema, reporting the first violation.
    pub fn validate(&self, params: &Value) -> Result<(), GatewayError> {
        if let Err(mut errors) = self.compiled.validate(params) {
            if let Some(first) = errors.next() {
                let path = first.instance_path.to_string();
                let detail = if path.is_empty() {
                    first.to_string()
                } else {
                    format!("{path}: {first}")
                };
                return Err(GatewayError::InvalidParams(detail));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> ParamSchema {
        ParamSchema::new(json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "default": "hi" }
            },
            "additionalProperties": false
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing() {
        let schema = echo_schema();
        let mut params = json!({});
        schema.apply_defaults(&mut params);
        assert_eq!(params["message"], "hi");
    }

    #[test]
    fn test_defaults_from_null_params() {
        let schema = echo_schema();
        let mut params = Value::Null;
        schema.apply_defaults(&mut params);
        assert_eq!(params["message"], "hi");
    }

    #[test]
    fn test_defaults_do_not_overwrite() {
        let schema = echo_schema();
        let mut params = json!({ "message": "hello" });
        schema.apply_defaults(&mut params);
        assert_eq!(params["message"], "hello");
    }

    #[test]
    fn test_type_violation_rejected() {
        let schema = echo_schema();
        let err = schema.validate(&json!({ "message": 42 })).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidParams(_)));
    }

    #[test]
    fn test_unknown_property_rejected() {
        let schema = echo_schema();
        assert!(schema.validate(&json!({ "bogus": true })).is_err());
    }

    #[test]
    fn test_bad_schema_fails_at_compile() {
        let err = ParamSchema::new(json!({ "type": "not-a-type" })).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSchema(_)));
    }
}
