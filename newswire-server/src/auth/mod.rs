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

use axum::{
    extract::Request as AxumRequest,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use newswire_core::{Identity, Permission};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use url::form_urlencoded;

pub mod rate_limit;
pub use rate_limit::{extract_client_ip, LayeredRateLimiter, RateDecision, RateLimiter, WindowKind};

// Type alias for the request type we use
type Request = AxumRequest;

/// Resolved credentials attached to each request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Option<Identity>,
    pub permissions: HashSet<Permission>,
}

impl AuthContext {
    /// The context granted when auth is optional and no credential resolves.
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            permissions: Permission::read_only(),
        }
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("Token validation failed: {0}")]
    TokenValidation(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// Bearer token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identifier
    pub sub: String,
    /// Granted permissions; read-only when absent
    pub permissions: Option<Vec<Permission>>,
    /// Expiration time
    pub exp: usize,
}

/// Authenticator trait for pluggable auth strategies
pub trait Authenticator: Send + Sync {
    /// Authenticate request by examining headers (synchronous)
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// API key authenticator backed by the shared key store
pub struct ApiKeyAuth {
    store: Arc<newswire_core::ApiKeyStore>,
}

impl ApiKeyAuth {
    pub fn new(store: Arc<newswire_core::ApiKeyStore>) -> Self {
        Self { store }
    }
}

impl Authenticator for ApiKeyAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let api_key = headers
            .get("X-API-Key")
            .or_else(|| headers.get("X-Newswire-API-Key"))
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let (identity, permissions) = self
            .store
            .verify(api_key)
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(AuthContext {
            identity: Some(identity),
            permissions,
        })
    }
}

/// Bearer token (JWT) authenticator
pub struct BearerTokenAuth {
    signing_secret: Vec<u8>,
}

impl BearerTokenAuth {
    pub fn new(signing_secret: String) -> Self {
        Self {
            signing_secret: signing_secret.into_bytes(),
        }
    }
}

impl Authenticator for BearerTokenAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingCredentials)?;

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(&self.signing_secret),
            &jsonwebtoken::Validation::default(),
        )
        .map_err(|e| AuthError::TokenValidation(e.to_string()))?;

        let permissions = token_data
            .claims
            .permissions
            .map(|perms| perms.into_iter().collect())
            .unwrap_or_else(Permission::read_only);

        Ok(AuthContext {
            identity: Some(Identity::Subject(token_data.claims.sub)),
            permissions,
        })
    }
}

/// Multi-strategy authenticator (tries multiple auth methods)
pub struct MultiAuth {
    strategies: Vec<Arc<dyn Authenticator>>,
}

impl MultiAuth {
    pub fn new(strategies: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { strategies }
    }
}

impl Authenticator for MultiAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let mut saw_credentials = false;
        for strategy in &self.strategies {
            match strategy.authenticate(headers) {
                Ok(ctx) => return Ok(ctx),
                Err(AuthError::MissingCredentials) => {}
                Err(_) => saw_credentials = true,
            }
        }
        if saw_credentials {
            Err(AuthError::InvalidCredentials)
        } else {
            Err(AuthError::MissingCredentials)
        }
    }
}

/// Resolve credentials for a request, falling back to query parameters
/// (`api_key` / `token`) for clients that cannot set headers, such as
/// browser WebSocket handshakes.
pub fn resolve_credentials(
    auth: &dyn Authenticator,
    headers: &HeaderMap,
    uri: &axum::http::Uri,
) -> Result<AuthContext, AuthError> {
    match auth.authenticate(headers) {
        Ok(ctx) => Ok(ctx),
        Err(primary_err) => {
            if let Some(synthesized) = query_credential_headers(uri) {
                if let Ok(ctx) = auth.authenticate(&synthesized) {
                    return Ok(ctx);
                }
            }
            Err(primary_err)
        }
    }
}

/// Whether unresolved credentials are rejected or downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Unresolved credentials are a 401.
    Required,
    /// A missing credential downgrades to the anonymous read-only
    /// context; a presented-and-invalid one is still a 401.
    Optional,
}

/// Authentication middleware. Attaches the resolved [`AuthContext`] as a
/// request extension.
pub async fn auth_middleware(
    auth: axum::Extension<Arc<dyn Authenticator>>,
    mode: axum::Extension<AuthMode>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ctx = match resolve_credentials(auth.as_ref(), req.headers(), req.uri()) {
        Ok(ctx) => ctx,
        Err(AuthError::MissingCredentials) if *mode == AuthMode::Optional => {
            AuthContext::anonymous()
        }
        Err(err) => return Err(err),
    };
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Build a header map carrying credentials found in the query string.
fn query_credential_headers(uri: &axum::http::Uri) -> Option<HeaderMap> {
    let query = uri.query()?;
    let mut headers = HeaderMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.to_ascii_lowercase().as_str() {
            "api_key" | "x-api-key" => {
                if let Ok(v) = HeaderValue::from_str(&value) {
                    headers.insert("X-API-Key", v);
                }
            }
            "token" => {
                if let Ok(v) = HeaderValue::from_str(&format!("Bearer {value}")) {
                    headers.insert(header::AUTHORIZATION, v);
                }
            }
            _ => {}
        }
    }
    if headers.is_empty() {
        None
    } else {
        Some(headers)
    }
}
