//! Bearer token authentication and scope checks for the HTTP surface.
//!
//! Tokens are configured statically (see [`crate::config::TokenGrant`]). Only
//! their SHA-256 digests are kept in memory after startup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use ring::digest::{digest, SHA256};
use thiserror::Error;
use tracing::{field, info_span, warn};

use crate::api::error::ApiError;
use crate::config::TokenGrant;
use crate::observability::MetricsRecorder;
use crate::secrets::Actor;

pub const SCOPE_STATUS_READ: &str = "secrets:status:read";
pub const SCOPE_BREAK_GLASS: &str = "secrets:break-glass";
pub const SCOPE_ROTATE: &str = "secrets:rotate";
pub const SCOPE_CACHE_ADMIN: &str = "secrets:cache-admin";

/// Request-scoped identity derived from a valid token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
    scopes: HashSet<String>,
}

impl AuthContext {
    pub fn new(actor: Actor, scopes: impl IntoIterator<Item = String>) -> Self {
        Self { actor, scopes: scopes.into_iter().collect() }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &String> {
        self.scopes.iter()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthorized: bearer token missing")]
    MissingBearer,
    #[error("unauthorized: malformed bearer token")]
    MalformedBearer,
    #[error("unauthorized: token not found")]
    TokenNotFound,
    #[error("forbidden: missing required scope")]
    Forbidden,
}

type TokenDigest = [u8; 32];

fn token_digest(token: &str) -> TokenDigest {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, token.as_bytes()).as_ref());
    out
}

/// Resolves bearer tokens to an [`AuthContext`].
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    grants: Arc<HashMap<TokenDigest, AuthContext>>,
    metrics: MetricsRecorder,
}

impl TokenAuthenticator {
    pub fn new(grants: &[TokenGrant], metrics: MetricsRecorder) -> Self {
        let grants = grants
            .iter()
            .map(|grant| {
                let context = AuthContext::new(
                    Actor::new(grant.actor_type, grant.actor_id.clone()),
                    grant.scopes.iter().cloned(),
                );
                (token_digest(grant.token.expose_secret()), context)
            })
            .collect();
        Self { grants: Arc::new(grants), metrics }
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Authenticate the raw `Authorization` header value.
    pub fn authenticate(&self, header: &str) -> Result<AuthContext, AuthError> {
        let header = header.trim();
        if header.is_empty() {
            self.metrics.record_authentication("missing_bearer");
            return Err(AuthError::MissingBearer);
        }

        let Some(token) = header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
        else {
            self.metrics.record_authentication("malformed");
            return Err(AuthError::MalformedBearer);
        };

        match self.grants.get(&token_digest(token)) {
            Some(context) => {
                self.metrics.record_authentication("success");
                Ok(context.clone())
            }
            None => {
                self.metrics.record_authentication("not_found");
                Err(AuthError::TokenNotFound)
            }
        }
    }
}

pub type ScopeState = Arc<Vec<String>>;

/// Middleware that authenticates the request and stores the [`AuthContext`]
/// as a request extension.
pub async fn authenticate(
    State(authenticator): State<TokenAuthenticator>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let correlation_id = uuid::Uuid::new_v4();
    let span = info_span!(
        "auth_middleware.authenticate",
        http.method = %method,
        http.path = %path,
        auth.actor_id = field::Empty,
        correlation_id = %correlation_id
    );
    let _guard = span.enter();

    let header =
        request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()).unwrap_or("");

    match authenticator.authenticate(header) {
        Ok(context) => {
            span.record("auth.actor_id", field::display(&context.actor.actor_id));
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(%correlation_id, error = %err, "authentication failed");
            Err(err.into())
        }
    }
}

/// Middleware that verifies the caller holds every required scope.
pub async fn ensure_scopes(
    State(required_scopes): State<ScopeState>,
    Extension(context): Extension<AuthContext>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if required_scopes.iter().all(|scope| context.has_scope(scope)) {
        return Ok(next.run(request).await);
    }

    let required = required_scopes.join(" ");
    let granted = context.scopes().map(String::as_str).collect::<Vec<_>>().join(" ");
    warn!(
        http.path = %request.uri().path(),
        actor_id = %context.actor.actor_id,
        required = %required,
        granted = %granted,
        "scope check failed"
    );
    Err(AuthError::Forbidden.into())
}
