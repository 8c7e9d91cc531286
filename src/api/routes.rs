use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::secrets::SecretLifecycle;

use super::{
    auth::{
        authenticate, ensure_scopes, ScopeState, TokenAuthenticator, SCOPE_BREAK_GLASS,
        SCOPE_CACHE_ADMIN, SCOPE_ROTATE, SCOPE_STATUS_READ,
    },
    handlers::{
        apply_break_glass_handler, clear_break_glass_handler, get_status_handler,
        refresh_cache_handler, rotation_preview_handler,
    },
};

#[derive(Clone)]
pub struct ApiState {
    pub lifecycle: SecretLifecycle,
}

pub fn build_router(lifecycle: SecretLifecycle, authenticator: TokenAuthenticator) -> Router {
    let api_state = ApiState { lifecycle };

    let auth_layer = middleware::from_fn_with_state(authenticator, authenticate);

    let scope_layer = |scopes: Vec<&str>| {
        let required: ScopeState =
            Arc::new(scopes.into_iter().map(|scope| scope.to_string()).collect());
        middleware::from_fn_with_state(required, ensure_scopes)
    };

    Router::new()
        .merge(
            Router::new()
                .route("/ops/secrets/status", get(get_status_handler))
                .route_layer(scope_layer(vec![SCOPE_STATUS_READ])),
        )
        .merge(
            Router::new()
                .route("/ops/secrets/break-glass", post(apply_break_glass_handler))
                .route("/ops/secrets/break-glass/{secret_type}", delete(clear_break_glass_handler))
                .route_layer(scope_layer(vec![SCOPE_BREAK_GLASS])),
        )
        .merge(
            Router::new()
                .route("/ops/secrets/rotation-preview", post(rotation_preview_handler))
                .route_layer(scope_layer(vec![SCOPE_ROTATE])),
        )
        .merge(
            Router::new()
                .route("/internal/secrets/cache/refresh", post(refresh_cache_handler))
                .route_layer(scope_layer(vec![SCOPE_CACHE_ADMIN])),
        )
        .with_state(api_state)
        .layer(auth_layer)
        .layer(TraceLayer::new_for_http())
}
