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

//! Gateway tool catalog
//!
//! The news tools themselves live behind the [`NewsProvider`] trait;
//! everything here is the gateway-side plumbing: schema declarations,
//! permission requirements, and handler shims that delegate to the
//! provider. [`StaticNewsProvider`] serves fixture data for development
//! and tests.

use crate::protocol::{Prompt, Resource};
use newswire_core::{
    CallerContext, GatewayError, Permission, ToolDefinition, ToolHandler, ToolRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// One news item as returned by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A trending topic with its mention count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    pub mentions: u64,
}

/// Boundary to the news backends. Fetching, scoring, and caching all
/// live on the far side of this trait.
#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    async fn headlines(&self, category: &str, limit: usize) -> Result<Vec<Article>, GatewayError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>, GatewayError>;
    async fn trending(&self, limit: usize) -> Result<Vec<TrendingTopic>, GatewayError>;
}

/// Fixture-backed provider used in development and tests.
#[derive(Default)]
pub struct StaticNewsProvider;

impl StaticNewsProvider {
    fn fixtures() -> Vec<Article> {
        let now = chrono::Utc::now();
        vec![
            Article {
                title: "Container shipping rates fall for third straight week".into(),
                source: "wire-desk".into(),
                url: "https://example.com/shipping-rates".into(),
                published_at: now,
                summary: Some("Spot rates on transpacific lanes continued to slide.".into()),
            },
            Article {
                title: "Regional banks report mixed quarterly earnings".into(),
                source: "markets-desk".into(),
                url: "https://example.com/bank-earnings".into(),
                published_at: now,
                summary: None,
            },
            Article {
                title: "New rail corridor opens between inland ports".into(),
                source: "wire-desk".into(),
                url: "https://example.com/rail-corridor".into(),
                published_at: now,
                summary: Some("The corridor cuts transit time by two days.".into()),
            },
        ]
    }
}

#[async_trait::async_trait]
impl NewsProvider for StaticNewsProvider {
    async fn headlines(&self, _category: &str, limit: usize) -> Result<Vec<Article>, GatewayError> {
        Ok(Self::fixtures().into_iter().take(limit).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Article>, GatewayError> {
        let needle = query.to_lowercase();
        Ok(Self::fixtures()
            .into_iter()
            .filter(|a| a.title.to_lowercase().contains(&needle))
            .take(limit)
            .collect())
    }

    async fn trending(&self, limit: usize) -> Result<Vec<TrendingTopic>, GatewayError> {
        Ok(vec![
            TrendingTopic { topic: "shipping".into(), mentions: 412 },
            TrendingTopic { topic: "earnings".into(), mentions: 287 },
            TrendingTopic { topic: "infrastructure".into(), mentions: 151 },
        ]
        .into_iter()
        .take(limit)
        .collect())
    }
}

struct HeadlinesTool {
    provider: Arc<dyn NewsProvider>,
}

#[async_trait::async_trait]
impl ToolHandler for HeadlinesTool {
    async fn call(&self, params: Value, ctx: CallerContext) -> Result<String, GatewayError> {
        let category = params["category"].as_str().unwrap_or("top");
        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        ctx.report_progress("fetching");
        let articles = self.provider.headlines(category, limit).await?;
        serde_json::to_string(&articles)
            .map_err(|e| GatewayError::ToolExecutionFailed(e.to_string()))
    }
}

struct SearchTool {
    provider: Arc<dyn NewsProvider>,
}

#[async_trait::async_trait]
impl ToolHandler for SearchTool {
    async fn call(&self, params: Value, ctx: CallerContext) -> Result<String, GatewayError> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidParams("query is required".into()))?;
        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        ctx.report_progress("searching");
        let articles = self.provider.search(query, limit).await?;
        serde_json::to_string(&articles)
            .map_err(|e| GatewayError::ToolExecutionFailed(e.to_string()))
    }
}

struct TrendingTool {
    provider: Arc<dyn NewsProvider>,
}

#[async_trait::async_trait]
impl ToolHandler for TrendingTool {
    async fn call(&self, params: Value, _ctx: CallerContext) -> Result<String, GatewayError> {
        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        let topics = self.provider.trending(limit).await?;
        serde_json::to_string(&topics)
            .map_err(|e| GatewayError::ToolExecutionFailed(e.to_string()))
    }
}

struct EchoTool;

#[async_trait::async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, params: Value, _ctx: CallerContext) -> Result<String, GatewayError> {
        Ok(params["message"].as_str().unwrap_or_default().to_string())
    }
}

/// Build the gateway's default tool set against one provider.
pub fn default_catalog(provider: Arc<dyn NewsProvider>, tool_timeout: Duration) -> ToolRegistry {
    let registry = ToolRegistry::new(tool_timeout);

    let definitions = [
        ToolDefinition::new(
            "headlines",
            "Top headlines for a category",
            json!({
                "type": "object",
                "properties": {
                    "category": { "type": "string", "default": "top" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
                },
                "additionalProperties": false
            }),
            [Permission::Read],
            Arc::new(HeadlinesTool { provider: provider.clone() }),
        ),
        ToolDefinition::new(
            "search",
            "Full-text search over recent articles",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "minLength": 1 },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            [Permission::Read],
            Arc::new(SearchTool { provider: provider.clone() }),
        ),
        ToolDefinition::new(
            "trending",
            "Currently trending topics",
            json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
                },
                "additionalProperties": false
            }),
            [Permission::Read],
            Arc::new(TrendingTool { provider }),
        ),
        ToolDefinition::new(
            "echo",
            "Echo a message back",
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "default": "hi" }
                },
                "additionalProperties": false
            }),
            [Permission::Read],
            Arc::new(EchoTool),
        ),
    ];

    for def in definitions {
        // Names are distinct literals; registration cannot collide.
        let def = def.expect("builtin tool schemas are valid");
        registry.register(def).expect("builtin tool names are unique");
    }

    registry
}

/// Static resources advertised by `resources/list`.
pub fn static_resources() -> Vec<Resource> {
    vec![
        Resource {
            uri: "newswire://catalog/sources".into(),
            name: "News sources".into(),
            description: Some("Feed identifiers the gateway aggregates".into()),
            mime_type: Some("application/json".into()),
        },
        Resource {
            uri: "newswire://catalog/categories".into(),
            name: "Headline categories".into(),
            description: None,
            mime_type: Some("application/json".into()),
        },
    ]
}

/// Contents for a static resource uri.
pub fn read_resource(uri: &str) -> Option<Value> {
    let contents = match uri {
        "newswire://catalog/sources" => json!(["wire-desk", "markets-desk"]),
        "newswire://catalog/categories" => {
            json!(["top", "business", "technology", "world"])
        }
        _ => return None,
    };
    Some(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": contents.to_string(),
        }]
    }))
}

/// Static prompts advertised by `prompts/list`.
pub fn static_prompts() -> Vec<Prompt> {
    vec![Prompt {
        name: "daily-briefing".into(),
        description: Some("Summarize today's top headlines".into()),
    }]
}

/// Expanded prompt payload for `prompts/get`.
pub fn get_prompt(name: &str) -> Option<Value> {
    match name {
        "daily-briefing" => Some(json!({
            "description": "Summarize today's top headlines",
            "messages": [{
                "role": "user",
                "content": {
                    "type": "text",
                    "text": "Fetch the top headlines and summarize them in three bullet points."
                }
            }]
        })),
        _ => None,
    }
}
