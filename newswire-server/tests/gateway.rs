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

//! End-to-end tests over the assembled HTTP router.

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use newswire_server::catalog::StaticNewsProvider;
use newswire_server::config::GatewayConfig;
use newswire_server::{build_adapters, build_router, build_state};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(config: GatewayConfig) -> Router {
    let state = build_state(config, Arc::new(StaticNewsProvider)).unwrap();
    let adapters = build_adapters(&state);
    build_router(&state, &adapters)
}

fn app() -> Router {
    app_with(GatewayConfig::default())
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
    extra_headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    for (name, value) in extra_headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, headers, value)
}

// ---------------------------------------------------------------------------
// REST surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rest_lists_tools_in_registration_order() {
    let (status, _, body) = send(&app(), "GET", "/api/v1/tools", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["headlines", "search", "trending", "echo"]);
}

#[tokio::test]
async fn test_rest_tool_detail_and_unknown() {
    let app = app();
    let (status, _, body) = send(&app, "GET", "/api/v1/tools/echo", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "echo");
    assert!(body["inputSchema"].is_object());

    let (status, _, body) = send(&app, "GET", "/api/v1/tools/missing", None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "unknown_tool");
}

#[tokio::test]
async fn test_rest_execute_echo_default() {
    let (status, _, body) = send(
        &app(),
        "POST",
        "/api/v1/tools/echo/execute",
        Some(json!({})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "hi");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn test_rest_execute_invalid_params() {
    let (status, _, body) = send(
        &app(),
        "POST",
        "/api/v1/tools/echo/execute",
        Some(json!({ "message": 42 })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_params");
}

#[tokio::test]
async fn test_rest_execute_malformed_body_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/tools/echo/execute")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["kind"], "invalid_request");

    // An empty body still means "no arguments".
    let (status, _, body) = send(&app(), "POST", "/api/v1/tools/echo/execute", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "hi");
}

#[tokio::test]
async fn test_rest_batch_settles_all_in_order() {
    let batch = json!([
        { "tool": "echo", "arguments": { "message": "first" } },
        { "bogus": true },
        { "tool": "echo", "arguments": { "message": "third" } },
    ]);
    let (status, _, body) = send(&app(), "POST", "/api/v1/tools/execute", Some(batch), &[]).await;
    assert_eq!(status, StatusCode::OK);

    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["result"], "first");
    assert_eq!(results[1]["ok"], false);
    assert_eq!(results[2]["result"], "third");
    assert_eq!(body["summary"]["total"], 3);
    assert_eq!(body["summary"]["succeeded"], 2);
    assert_eq!(body["summary"]["failed"], 1);
}

#[tokio::test]
async fn test_rest_batch_too_large() {
    let entries: Vec<Value> = (0..26).map(|_| json!({ "tool": "echo" })).collect();
    let (status, _, body) = send(
        &app(),
        "POST",
        "/api/v1/tools/execute",
        Some(Value::Array(entries)),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["kind"], "batch_too_large");
}

#[tokio::test]
async fn test_rest_rate_limit_window() {
    let mut config = GatewayConfig::default();
    config.rate_limit.tools.limit = 2;
    let app = app_with(config);

    for _ in 0..2 {
        let (status, _, _) = send(
            &app,
            "POST",
            "/api/v1/tools/echo/execute",
            Some(json!({})),
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, headers, body) = send(
        &app,
        "POST",
        "/api/v1/tools/echo/execute",
        Some(json!({})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["kind"], "rate_limited");
    let retry_after: u64 = headers
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);
    assert!(body["error"]["retryAfterSeconds"].as_u64().unwrap() <= 60);

    // A different tool under its own budget still works.
    let (status, _, _) = send(
        &app,
        "POST",
        "/api/v1/tools/trending/execute",
        Some(json!({})),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Health stays reachable regardless of limiter pressure.
    let (status, _, _) = send(&app, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rest_operational_endpoints() {
    let app = app();
    let (status, _, body) = send(&app, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = send(&app, "GET", "/status", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tools"], 4);
    assert_eq!(body["protocols"]["rest"], true);

    let (status, _, body) = send(&app, "GET", "/metrics", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["invocations"].is_u64());
}

#[tokio::test]
async fn test_docs_content_negotiation() {
    let app = app();
    let (status, headers, _) = send(&app, "GET", "/docs", None, &[("Accept", "text/html")]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let (status, _, body) = send(&app, "GET", "/docs", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endpoints"].is_array());
}

// ---------------------------------------------------------------------------
// HTTP JSON-RPC surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rpc_list_then_call() {
    let app = app();
    let (status, _, body) = send(
        &app,
        "POST",
        "/rpc",
        Some(json!({ "jsonrpc": "2.0", "method": "tools/list", "id": 1 })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert!(body["result"]["tools"].is_array());

    let (status, _, body) = send(
        &app,
        "POST",
        "/rpc",
        Some(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": "echo", "arguments": {} },
            "id": 2
        })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["content"][0]["text"], "hi");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_rpc_batch_preserves_order_and_isolates_failures() {
    let batch = json!([
        { "jsonrpc": "2.0", "method": "ping", "id": 1 },
        { "jsonrpc": "1.0", "method": "ping", "id": 2 },
        {
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": "echo", "arguments": { "message": "last" } },
            "id": 3
        },
    ]);
    let (status, _, body) = send(&app(), "POST", "/rpc", Some(batch), &[]).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["id"], 1);
    assert!(entries[0]["result"].is_object());
    assert_eq!(entries[1]["id"], 2);
    assert_eq!(entries[1]["error"]["code"], -32600);
    assert_eq!(entries[2]["result"]["content"][0]["text"], "last");
}

#[tokio::test]
async fn test_rpc_empty_batch_rejected() {
    let (status, _, body) = send(&app(), "POST", "/rpc", Some(json!([])), &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_rpc_malformed_json_is_parse_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_rpc_unknown_tool_code() {
    let (_, _, body) = send(
        &app(),
        "POST",
        "/rpc",
        Some(json!({
            "jsonrpc": "2.0",
            "method": "tools/call",
            "params": { "name": "missing", "arguments": {} },
            "id": 4
        })),
        &[],
    )
    .await;
    assert_eq!(body["error"]["code"], -32001);
}

// ---------------------------------------------------------------------------
// Authentication modes
// ---------------------------------------------------------------------------

fn secured_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.required = true;
    config.auth.api_keys = vec!["ci:nw_integration_secret:read|write".into()];
    config
}

#[tokio::test]
async fn test_required_auth_rejects_anonymous() {
    let app = app_with(secured_config());
    let (status, _, _) = send(&app, "GET", "/api/v1/tools", None, &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        "POST",
        "/rpc",
        Some(json!({ "jsonrpc": "2.0", "method": "ping", "id": 1 })),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Operational endpoints stay open.
    let (status, _, _) = send(&app, "GET", "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_required_auth_accepts_api_key() {
    let app = app_with(secured_config());
    let (status, _, body) = send(
        &app,
        "GET",
        "/api/v1/tools",
        None,
        &[("X-API-Key", "nw_integration_secret")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tools"].is_array());
}

#[tokio::test]
async fn test_invalid_key_rejected_even_in_optional_mode() {
    let mut config = GatewayConfig::default();
    config.auth.api_keys = vec!["ci:nw_integration_secret:read".into()];
    let app = app_with(config);

    let (status, _, _) = send(
        &app,
        "GET",
        "/api/v1/tools",
        None,
        &[("X-API-Key", "nw_wrong_secret")],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Anonymous read access still works without any credential.
    let (status, _, _) = send(&app, "GET", "/api/v1/tools", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
}
