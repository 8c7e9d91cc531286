//! Validate-then-promote rotation previews.
//!
//! A preview fetches a candidate vault version directly (the cache is not
//! consulted or changed) and, if the fetch succeeds, records the validation
//! on the metadata record. At most one preview per secret type runs at a
//! time; a second attempt fails fast with `RotationInProgress`. Previews for
//! different secret types never contend.

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use super::clock::SharedClock;
use super::error::{Result, SecretsError};
use super::metadata::{AccessAction, AccessEvent, MetadataStore, MetadataUpdate};
use super::types::{Actor, RotationStatus, SecretType};
use super::vault::VaultClient;
use crate::observability::MetricsRecorder;

/// Outcome of a successful rotation preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPreview {
    pub validated: bool,
    pub latency_ms: u64,
    pub version: String,
}

/// Releases the per-type rotation lock when dropped, on every exit path.
struct RotationLock<'a> {
    held: &'a DashSet<SecretType>,
    secret_type: SecretType,
}

impl Drop for RotationLock<'_> {
    fn drop(&mut self) {
        self.held.remove(&self.secret_type);
    }
}

pub struct RotationCoordinator {
    vault: Arc<dyn VaultClient>,
    store: Arc<dyn MetadataStore>,
    clock: SharedClock,
    metrics: MetricsRecorder,
    held: DashSet<SecretType>,
}

impl std::fmt::Debug for RotationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationCoordinator").field("held", &self.held).finish()
    }
}

impl RotationCoordinator {
    pub fn new(
        vault: Arc<dyn VaultClient>,
        store: Arc<dyn MetadataStore>,
        clock: SharedClock,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { vault, store, clock, metrics, held: DashSet::new() }
    }

    /// Whether a preview for `secret_type` is currently running.
    pub fn is_rotating(&self, secret_type: SecretType) -> bool {
        self.held.contains(&secret_type)
    }

    fn try_lock(&self, secret_type: SecretType) -> Option<RotationLock<'_>> {
        self.held.insert(secret_type).then(|| RotationLock { held: &self.held, secret_type })
    }

    /// Validate `new_vault_version` for `secret_type`.
    ///
    /// On failure the metadata status is rolled back to what it was before
    /// the attempt and the underlying error is returned.
    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn start_rotation_preview(
        &self,
        secret_type: SecretType,
        new_vault_version: &str,
        actor: &Actor,
    ) -> Result<RotationPreview> {
        let Some(_lock) = self.try_lock(secret_type) else {
            warn!(secret_type = %secret_type, "Rotation preview rejected, already in progress");
            let err = SecretsError::RotationInProgress { secret_type };
            self.finish(secret_type, actor, Err(&err), None).await;
            return Err(err);
        };

        let outcome = self.validate(secret_type, new_vault_version).await;
        match outcome {
            Ok((preview, duration_ms)) => {
                info!(
                    secret_type = %secret_type,
                    version = %preview.version,
                    latency_ms = preview.latency_ms,
                    "Rotation preview validated"
                );
                self.finish(secret_type, actor, Ok(&preview.version), Some(duration_ms)).await;
                Ok(preview)
            }
            Err(err) => {
                self.finish(secret_type, actor, Err(&err), None).await;
                Err(err)
            }
        }
    }

    async fn validate(
        &self,
        secret_type: SecretType,
        new_vault_version: &str,
    ) -> Result<(RotationPreview, u64)> {
        let metadata = self.store.require_metadata(secret_type).await?;
        let previous_status = metadata.status;

        self.store
            .update_metadata(secret_type, MetadataUpdate::new().status(RotationStatus::Rotating))
            .await?;

        let started = Instant::now();
        let fetched = self
            .vault
            .access_secret_version(&metadata.vault_resource_id, new_vault_version)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let candidate = match fetched {
            Ok(candidate) => candidate,
            Err(err) => {
                warn!(
                    secret_type = %secret_type,
                    version_alias = %new_vault_version,
                    error = %err,
                    "Rotation candidate fetch failed, rolling back"
                );
                self.roll_back(secret_type, previous_status).await;
                return Err(err);
            }
        };

        let promoted = self
            .store
            .update_metadata(
                secret_type,
                MetadataUpdate::new()
                    .status(RotationStatus::Active)
                    .last_validated_at(self.clock.now()),
            )
            .await;
        if let Err(err) = promoted {
            self.roll_back(secret_type, previous_status).await;
            return Err(err);
        }

        self.metrics.record_vault_fetch_duration(secret_type, latency_ms as f64 / 1000.0);
        Ok((
            RotationPreview { validated: true, latency_ms, version: candidate.version },
            candidate.duration_ms,
        ))
    }

    async fn roll_back(&self, secret_type: SecretType, previous_status: RotationStatus) {
        if let Err(err) = self
            .store
            .update_metadata(secret_type, MetadataUpdate::new().status(previous_status))
            .await
        {
            error!(
                secret_type = %secret_type,
                status = %previous_status,
                error = %err,
                "Failed to restore metadata status after rotation preview"
            );
        }
    }

    async fn finish(
        &self,
        secret_type: SecretType,
        actor: &Actor,
        outcome: std::result::Result<&String, &SecretsError>,
        duration_ms: Option<u64>,
    ) {
        let now = self.clock.now();
        let event = match outcome {
            Ok(version) => {
                self.metrics.record_rotation_preview(secret_type, true);
                let event = AccessEvent::success(secret_type, AccessAction::RotationPreview, actor, now)
                    .with_vault_version(Some(version.clone()));
                match duration_ms {
                    Some(ms) => event.with_duration_ms(ms),
                    None => event,
                }
            }
            Err(err) => {
                self.metrics.record_rotation_preview(secret_type, false);
                AccessEvent::failure(secret_type, AccessAction::RotationPreview, actor, err, now)
            }
        };

        if let Err(err) = self.store.record_access_event(event).await {
            error!(secret_type = %secret_type, error = %err, "Failed to record access event");
        }
    }
}
