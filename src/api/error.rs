use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::auth::AuthError;
use crate::secrets::SecretsError;

#[derive(Debug)]
pub enum ApiError {
    Unprocessable { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    ServiceUnavailable { code: &'static str, message: String },
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unprocessable<S: Into<String>>(msg: S) -> Self {
        ApiError::Unprocessable { code: "invalid_request", message: msg.into() }
    }

    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden(msg.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let (error, message) = match self {
            ApiError::Unprocessable { code, message }
            | ApiError::Conflict { code, message }
            | ApiError::ServiceUnavailable { code, message } => (code, message),
            ApiError::NotFound(message) => ("not_found", message),
            ApiError::Unauthorized(message) => ("unauthorized", message),
            ApiError::Forbidden(message) => ("forbidden", message),
            ApiError::Internal(message) => ("internal_error", message),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<SecretsError> for ApiError {
    fn from(err: SecretsError) -> Self {
        let code = err.error_code();
        let message = err.to_string();
        match err {
            SecretsError::InvalidBreakGlassTtl { .. }
            | SecretsError::InvalidBreakGlassPayload { .. } => {
                ApiError::Unprocessable { code, message }
            }
            SecretsError::RotationInProgress { .. }
            | SecretsError::InvalidStatusTransition { .. } => ApiError::Conflict { code, message },
            SecretsError::NotFound { .. } => ApiError::NotFound(message),
            SecretsError::SecretUnavailable { .. }
            | SecretsError::Vault { .. }
            | SecretsError::Store { .. }
            | SecretsError::Config { .. } => ApiError::ServiceUnavailable { code, message },
            SecretsError::Internal { .. } => ApiError::Internal(message),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer | AuthError::MalformedBearer | AuthError::TokenNotFound => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::Forbidden => ApiError::forbidden(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::unprocessable(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::unprocessable(format!("Validation failed: {}", errors))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::unprocessable(rejection.body_text())
    }
}
