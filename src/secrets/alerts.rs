//! Consecutive-failure tracking and escalation.
//!
//! Each secret type has a counter of consecutive cache failures. Reaching the
//! threshold raises exactly one [`Escalation`]; a success resets the counter.
//! Break-glass activity is always logged.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, warn};

use super::clock::SharedClock;
use super::error::SecretsError;
use super::types::SecretType;
use crate::observability::MetricsRecorder;

/// Default number of consecutive failures that triggers an escalation.
pub const DEFAULT_ALERT_THRESHOLD: u32 = 3;

const ESCALATION_CHANNEL_CAPACITY: usize = 64;

/// Signal raised when a secret type keeps failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub secret_type: SecretType,
    pub consecutive_failures: u32,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AlertSink {
    threshold: u32,
    failures: DashMap<SecretType, u32>,
    escalations: broadcast::Sender<Escalation>,
    metrics: MetricsRecorder,
    clock: SharedClock,
}

impl AlertSink {
    pub fn new(threshold: u32, metrics: MetricsRecorder, clock: SharedClock) -> Self {
        let (escalations, _) = broadcast::channel(ESCALATION_CHANNEL_CAPACITY);
        Self { threshold: threshold.max(1), failures: DashMap::new(), escalations, metrics, clock }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Count a failure for `secret_type`. Returns the escalation if this
    /// failure brought the counter to the threshold.
    pub fn record_cache_failure(&self, secret_type: SecretType, reason: &str) -> Option<Escalation> {
        let count = {
            let mut counter = self.failures.entry(secret_type).or_insert(0);
            *counter = counter.saturating_add(1);
            *counter
        };

        self.metrics.record_cache_failure(secret_type);
        warn!(
            secret_type = %secret_type,
            consecutive_failures = count,
            reason = %reason,
            "Secret cache failure"
        );

        if count != self.threshold {
            return None;
        }

        let escalation = Escalation {
            secret_type,
            consecutive_failures: count,
            reason: reason.to_string(),
            raised_at: self.clock.now(),
        };
        error!(
            secret_type = %secret_type,
            consecutive_failures = count,
            threshold = self.threshold,
            reason = %reason,
            "Secret failures reached escalation threshold"
        );
        self.metrics.record_escalation(secret_type);
        // Errors only when nobody is subscribed
        let _ = self.escalations.send(escalation.clone());
        Some(escalation)
    }

    /// Clear the failure counter after a success.
    pub fn reset_failure(&self, secret_type: SecretType) {
        self.failures.remove(&secret_type);
    }

    pub fn failure_count(&self, secret_type: SecretType) -> u32 {
        self.failures.get(&secret_type).map(|count| *count).unwrap_or(0)
    }

    /// Log a break-glass attempt. Always emitted, whatever the outcome.
    pub fn record_break_glass(
        &self,
        secret_type: SecretType,
        expires_at: DateTime<Utc>,
        actor_id: &str,
        outcome: Option<&SecretsError>,
    ) {
        self.metrics.record_break_glass(secret_type, outcome.is_none());
        match outcome {
            None => warn!(
                secret_type = %secret_type,
                expires_at = %expires_at,
                actor_id = %actor_id,
                "Break-glass override applied"
            ),
            Some(err) => warn!(
                secret_type = %secret_type,
                expires_at = %expires_at,
                actor_id = %actor_id,
                error_code = err.error_code(),
                error = %err,
                "Break-glass override rejected"
            ),
        }
    }

    /// Receive every escalation raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Escalation> {
        self.escalations.subscribe()
    }
}
