//! # Configuration Management
//!
//! Environment-driven configuration for the secretops service, validated with
//! `validator` before anything is started.

pub mod settings;

pub use settings::{
    parse_token_grants, ApiConfig, AppConfig, AuthConfig, BreakGlassConfig, ObservabilityConfig,
    SecretsSettings, TokenGrant,
};
