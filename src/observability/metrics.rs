//! # Metrics Collection
//!
//! Prometheus metrics for the secret lifecycle. The recorder is an owned
//! handle passed to the components that report through it; with no exporter
//! installed every call is a no-op.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use crate::secrets::{CacheSource, SecretType};
use ::tracing::{info, warn};
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks secret lifecycle metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of a secret read
    pub fn record_secret_read(&self, secret_type: SecretType, source: Option<CacheSource>, success: bool) {
        let labels = [
            ("secret_type", secret_type.as_str().to_string()),
            ("source", source.map(|s| s.as_str()).unwrap_or("none").to_string()),
            ("result", result_label(success).to_string()),
        ];
        counter!("secrets_reads_total", &labels).increment(1);
    }

    /// Record a failed cache fill
    pub fn record_cache_failure(&self, secret_type: SecretType) {
        let labels = [("secret_type", secret_type.as_str().to_string())];
        counter!("secrets_cache_failures_total", &labels).increment(1);
    }

    /// Record an escalation raised by the alert sink
    pub fn record_escalation(&self, secret_type: SecretType) {
        let labels = [("secret_type", secret_type.as_str().to_string())];
        counter!("secrets_escalations_total", &labels).increment(1);
    }

    pub fn record_rotation_preview(&self, secret_type: SecretType, success: bool) {
        let labels = [
            ("secret_type", secret_type.as_str().to_string()),
            ("result", result_label(success).to_string()),
        ];
        counter!("secrets_rotation_previews_total", &labels).increment(1);
    }

    pub fn record_break_glass(&self, secret_type: SecretType, success: bool) {
        let labels = [
            ("secret_type", secret_type.as_str().to_string()),
            ("result", result_label(success).to_string()),
        ];
        counter!("secrets_break_glass_total", &labels).increment(1);
    }

    /// Record a secret found past its rotation deadline by a monitor sweep
    pub fn record_rotation_overdue(&self, secret_type: SecretType) {
        let labels = [("secret_type", secret_type.as_str().to_string())];
        counter!("secrets_rotation_overdue_total", &labels).increment(1);
    }

    /// Record vault round-trip time in seconds
    pub fn record_vault_fetch_duration(&self, secret_type: SecretType, duration: f64) {
        let labels = [("secret_type", secret_type.as_str().to_string())];
        histogram!("secrets_vault_fetch_duration_seconds", &labels).record(duration);
    }

    /// Update the cache age gauge
    pub fn set_cache_age(&self, secret_type: SecretType, age_seconds: f64) {
        let labels = [("secret_type", secret_type.as_str().to_string())];
        gauge!("secrets_cache_age_seconds", &labels).set(age_seconds);
    }

    /// Record an API authentication attempt by outcome
    pub fn record_authentication(&self, outcome: &'static str) {
        counter!("secrets_api_authentications_total", "result" => outcome).increment(1);
    }

    /// Register baseline secret metrics so Prometheus exports appear before events occur.
    pub fn register_secret_metrics(&self) {
        describe_counter!(
            "secrets_reads_total",
            Unit::Count,
            "Secret reads grouped by secret type, cache source and outcome"
        );
        describe_counter!(
            "secrets_cache_failures_total",
            Unit::Count,
            "Vault fetches that left a secret without a usable value"
        );
        describe_counter!(
            "secrets_escalations_total",
            Unit::Count,
            "Escalations raised after consecutive cache failures"
        );
        describe_counter!(
            "secrets_rotation_previews_total",
            Unit::Count,
            "Rotation previews grouped by outcome"
        );
        describe_counter!(
            "secrets_break_glass_total",
            Unit::Count,
            "Break-glass applications grouped by outcome"
        );
        describe_counter!(
            "secrets_rotation_overdue_total",
            Unit::Count,
            "Overdue rotations observed by the rotation monitor"
        );
        describe_counter!(
            "secrets_api_authentications_total",
            Unit::Count,
            "Bearer token authentication attempts grouped by outcome"
        );
        describe_histogram!(
            "secrets_vault_fetch_duration_seconds",
            Unit::Seconds,
            "Vault round-trip time for secret fetches"
        );
        describe_gauge!(
            "secrets_cache_age_seconds",
            Unit::Seconds,
            "Age of the cached value per secret type"
        );

        for secret_type in SecretType::ALL {
            let labels = [("secret_type", secret_type.as_str().to_string())];
            counter!("secrets_cache_failures_total", &labels).absolute(0);
            counter!("secrets_escalations_total", &labels).absolute(0);
            counter!("secrets_rotation_overdue_total", &labels).absolute(0);
        }
    }
}

fn result_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Install the Prometheus exporter when enabled and return the recorder.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<MetricsRecorder> {
    let recorder = MetricsRecorder::new();
    if !config.enable_metrics {
        return Ok(recorder);
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(recorder);
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    recorder.register_secret_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(recorder)
}
