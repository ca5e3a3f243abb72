//! Request authentication.
//!
//! Three credential paths, exactly one accepted per request:
//! the `x-internal-token` shared secret, a bearer API key, or a user
//! session validated by the pluggable identity provider. Guarded paths
//! with none of them return 401.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cascade_core::OrganizationId;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

/// Who a request is acting as.
#[derive(Debug, Clone)]
pub enum Identity {
    /// The worker, via the internal shared secret.
    Internal,
    /// A caller holding a bearer API key.
    ApiKey {
        /// Organization the key is scoped to, when any.
        organization_id: Option<OrganizationId>,
    },
    /// A human session validated by the identity provider.
    User {
        /// Provider-assigned subject.
        subject: String,
        /// Organization, when the provider scopes sessions.
        organization_id: Option<OrganizationId>,
    },
}

/// Validates user sessions and API keys. Deployments plug providers in
/// here; only the static env-credential provider ships with the core.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validate a bearer API key.
    async fn validate_api_key(&self, key: &str) -> Option<Identity>;

    /// Validate a user session from request headers.
    async fn authenticate_session(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// HTTP Basic against the admin credentials from the environment; the
/// admin password doubles as the development bearer API key.
pub struct StaticAdminProvider {
    username: String,
    password: String,
}

impl StaticAdminProvider {
    /// Build from the configured admin credentials.
    #[must_use]
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    fn check_password(&self, presented: &str) -> bool {
        self.password
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into()
    }
}

#[async_trait]
impl IdentityProvider for StaticAdminProvider {
    async fn validate_api_key(&self, key: &str) -> Option<Identity> {
        self.check_password(key).then_some(Identity::ApiKey {
            organization_id: None,
        })
    }

    async fn authenticate_session(&self, headers: &HeaderMap) -> Option<Identity> {
        let authorization = headers.get("authorization")?.to_str().ok()?;
        let encoded = authorization.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        let username_ok: bool = self
            .username
            .as_bytes()
            .ct_eq(username.as_bytes())
            .into();
        (username_ok && self.check_password(password)).then(|| Identity::User {
            subject: username.to_owned(),
            organization_id: None,
        })
    }
}

/// Resolve a request's identity, trying each path in order.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    if let Some(token) = headers.get("x-internal-token").and_then(|v| v.to_str().ok()) {
        if verify_internal_token(state, token) {
            return Some(Identity::Internal);
        }
        // A wrong internal token never falls through to other paths.
        return None;
    }

    if let Some(authorization) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(key) = authorization.strip_prefix("Bearer ") {
            return state.identity.validate_api_key(key).await;
        }
    }

    state.identity.authenticate_session(headers).await
}

/// Constant-time check of the internal shared secret.
#[must_use]
pub fn verify_internal_token(state: &AppState, presented: &str) -> bool {
    state
        .config
        .internal_token
        .as_bytes()
        .ct_eq(presented.as_bytes())
        .into()
}

/// Middleware guarding the authenticated API surface.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = resolve_identity(&state, request.headers())
        .await
        .ok_or_else(ApiError::unauthenticated)?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Middleware guarding `/internal/*`: only the shared secret is
/// accepted.
pub async fn require_internal(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get("x-internal-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(ApiError::unauthenticated)?;
    if !verify_internal_token(&state, presented) {
        return Err(ApiError::unauthenticated());
    }
    Ok(next.run(request).await)
}
