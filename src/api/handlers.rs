use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::secrets::{
    BreakGlassApplied, BreakGlassRequest, RotationPreview, SecretType, StatusReport,
};

use super::auth::AuthContext;
use super::error::ApiError;
use super::routes::ApiState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassBody {
    pub secret_type: SecretType,

    #[validate(length(min = 1))]
    pub ciphertext: String,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RotationPreviewBody {
    pub secret_type: SecretType,

    #[validate(length(min = 1, max = 64))]
    pub vault_version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRefreshBody {
    #[serde(default)]
    pub secret_type: Option<SecretType>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRefreshResponse {
    pub request_id: Uuid,
    pub refreshed_secret_types: Vec<SecretType>,
}

#[instrument(skip(state, context), fields(actor_id = %context.actor.actor_id))]
pub async fn get_status_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<StatusReport>, ApiError> {
    let report = state.lifecycle.status.get_status().await?;
    Ok(Json(report))
}

#[instrument(skip(state, context, payload), fields(actor_id = %context.actor.actor_id))]
pub async fn apply_break_glass_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<BreakGlassBody>, JsonRejection>,
) -> Result<(StatusCode, Json<BreakGlassApplied>), ApiError> {
    let Json(body) = payload?;
    body.validate()?;

    let applied = state
        .lifecycle
        .break_glass
        .apply_break_glass(BreakGlassRequest {
            secret_type: body.secret_type,
            ciphertext: body.ciphertext,
            expires_at: body.expires_at,
            actor: context.actor,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(applied)))
}

#[instrument(skip(state, context), fields(actor_id = %context.actor.actor_id))]
pub async fn clear_break_glass_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    secret_type: Result<Path<SecretType>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(secret_type) = secret_type?;
    state.lifecycle.break_glass.clear_break_glass(secret_type, &context.actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, context, payload), fields(actor_id = %context.actor.actor_id))]
pub async fn rotation_preview_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<RotationPreviewBody>, JsonRejection>,
) -> Result<Json<RotationPreview>, ApiError> {
    let Json(body) = payload?;
    body.validate()?;

    let preview = state
        .lifecycle
        .rotation
        .start_rotation_preview(body.secret_type, &body.vault_version, &context.actor)
        .await?;
    Ok(Json(preview))
}

/// The body is optional; an empty body refreshes every known secret type.
#[instrument(skip(state, context, body), fields(actor_id = %context.actor.actor_id))]
pub async fn refresh_cache_handler(
    State(state): State<ApiState>,
    Extension(context): Extension<AuthContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<CacheRefreshResponse>), ApiError> {
    let request: CacheRefreshBody = if body.iter().all(u8::is_ascii_whitespace) {
        CacheRefreshBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::unprocessable(format!("Invalid request body: {}", err)))?
    };

    let request_id = Uuid::new_v4();
    let refreshed_secret_types =
        state.lifecycle.manager.refresh(request.secret_type, &context.actor).await?;
    info!(%request_id, refreshed = refreshed_secret_types.len(), "Cache refresh requested");

    Ok((StatusCode::ACCEPTED, Json(CacheRefreshResponse { request_id, refreshed_secret_types })))
}
