//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: human-readable by default, JSON
//! when `SECRETOPS_LOG_JSON=true`. Secret values never reach the log; they
//! travel as [`crate::secrets::SecretString`], which prints `[REDACTED]`.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level).map_err(|e| {
        Error::config(format!("Invalid log filter '{}': {}", config.log_level, e))
    })?;

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logging {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        api_address = %config.api.bind_address(),
        environment = %config.secrets.environment,
        vault_configured = config.vault.is_some(),
        break_glass_enabled = config.break_glass.key_base64.is_some(),
        api_tokens = config.auth.tokens.len(),
        cache_ttl_seconds = config.secrets.cache_ttl_seconds,
        monitor_interval_seconds = config.secrets.monitor_interval_seconds,
        metrics_enabled = %config.observability.enable_metrics,
        "secretops configuration"
    );
}
