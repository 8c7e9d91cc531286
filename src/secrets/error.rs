//! Error types for secret lifecycle operations.

use thiserror::Error;

use super::types::{RotationStatus, SecretType};

/// Result type for secrets operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur during secret lifecycle operations.
///
/// `Clone` so that a single in-flight vault fetch can hand the same outcome to
/// every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    /// Break-glass expiry is not in the future or exceeds the maximum override window.
    #[error("Invalid break-glass TTL: {reason}")]
    InvalidBreakGlassTtl { reason: String },

    /// Break-glass ciphertext is not a well-formed, decryptable envelope.
    #[error("Invalid break-glass payload: {reason}")]
    InvalidBreakGlassPayload { reason: String },

    /// No valid cache entry and the vault fetch failed.
    #[error("Secret '{secret_type}' unavailable: {reason}")]
    SecretUnavailable { secret_type: SecretType, reason: String },

    /// A rotation preview for the same secret type is already running.
    #[error("Rotation already in progress for secret '{secret_type}'")]
    RotationInProgress { secret_type: SecretType },

    /// Metadata status change that the lifecycle does not allow.
    #[error("Invalid status transition for secret '{secret_type}': {from} -> {to}")]
    InvalidStatusTransition { secret_type: SecretType, from: RotationStatus, to: RotationStatus },

    /// No metadata record exists for the secret type.
    #[error("Secret metadata not found: {secret_type}")]
    NotFound { secret_type: SecretType },

    /// Transient failure talking to the vault (network, permission, timeout).
    #[error("Vault error: {message}")]
    Vault { message: String },

    /// Failure in the metadata store.
    #[error("Metadata store error: {message}")]
    Store { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SecretsError {
    pub fn invalid_ttl(reason: impl Into<String>) -> Self {
        Self::InvalidBreakGlassTtl { reason: reason.into() }
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidBreakGlassPayload { reason: reason.into() }
    }

    pub fn unavailable(secret_type: SecretType, reason: impl Into<String>) -> Self {
        Self::SecretUnavailable { secret_type, reason: reason.into() }
    }

    pub fn vault(message: impl Into<String>) -> Self {
        Self::Vault { message: message.into() }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Stable machine-readable code, recorded on access events.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBreakGlassTtl { .. } => "invalid_break_glass_ttl",
            Self::InvalidBreakGlassPayload { .. } => "invalid_break_glass_payload",
            Self::SecretUnavailable { .. } => "secret_unavailable",
            Self::RotationInProgress { .. } => "rotation_in_progress",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::NotFound { .. } => "not_found",
            Self::Vault { .. } => "vault_error",
            Self::Store { .. } => "store_error",
            Self::Config { .. } => "config_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Whether a later retry may succeed without any change in input.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SecretUnavailable { .. } | Self::Vault { .. } | Self::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SecretsError::RotationInProgress { secret_type: SecretType::SigningSeed };
        assert_eq!(err.to_string(), "Rotation already in progress for secret 'signing-seed'");

        let err = SecretsError::unavailable(SecretType::TradingApiKey, "connection refused");
        assert!(err.to_string().contains("trading-api-key"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_codes_and_transience() {
        assert_eq!(SecretsError::invalid_ttl("too long").error_code(), "invalid_break_glass_ttl");
        assert!(!SecretsError::invalid_payload("bad base64").is_transient());
        assert!(SecretsError::vault("timeout").is_transient());
        assert!(SecretsError::unavailable(SecretType::SigningSeed, "down").is_transient());
        assert!(!SecretsError::RotationInProgress { secret_type: SecretType::SigningSeed }
            .is_transient());
    }
}
