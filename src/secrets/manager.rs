//! Read and refresh paths with their side effects.
//!
//! [`SecretManager`] wraps [`SecretCache`] for callers that consume secrets.
//! Each read or refresh is audited, feeds the alert sink, and keeps the
//! denormalized cache fields on the metadata record current. A fetch failure
//! with nothing usable left in the cache installs the `empty` sentinel.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

use super::alerts::AlertSink;
use super::cache::{CachedSecret, FetchOrigin, SecretCache};
use super::clock::SharedClock;
use super::error::{Result, SecretsError};
use super::metadata::{AccessAction, AccessEvent, MetadataStore, MetadataUpdate, SecretMetadata};
use super::types::{Actor, CacheSource, SecretType};
use crate::observability::MetricsRecorder;

#[derive(Debug)]
pub struct SecretManager {
    cache: SecretCache,
    store: Arc<dyn MetadataStore>,
    alerts: Arc<AlertSink>,
    clock: SharedClock,
    metrics: MetricsRecorder,
}

impl SecretManager {
    pub fn new(
        cache: SecretCache,
        store: Arc<dyn MetadataStore>,
        alerts: Arc<AlertSink>,
        clock: SharedClock,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { cache, store, alerts, clock, metrics }
    }

    /// Current usable value of `secret_type`, fetched from the vault if needed.
    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn read_secret(&self, secret_type: SecretType, actor: &Actor) -> Result<CachedSecret> {
        let metadata = self.store.require_metadata(secret_type).await?;
        let started = Instant::now();

        let (origin, outcome) = self.cache.get_or_fetch_with_origin(&metadata).await;
        match outcome {
            Ok(entry) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if origin == FetchOrigin::Started && entry.source == CacheSource::Vault {
                    self.metrics
                        .record_vault_fetch_duration(secret_type, elapsed_ms as f64 / 1000.0);
                }
                self.on_success(&metadata, &entry, AccessAction::Read, actor, elapsed_ms).await;
                Ok(entry)
            }
            Err(err) => {
                self.on_failure(&metadata, AccessAction::Read, actor, &err, origin).await;
                Err(err)
            }
        }
    }

    /// Force a vault refresh of one secret type, or of every known type.
    ///
    /// Returns the types whose cache now holds a freshly fetched vault value.
    /// Types under a break-glass override are left alone and not reported.
    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn refresh(&self, secret_type: Option<SecretType>, actor: &Actor) -> Result<Vec<SecretType>> {
        let targets: Vec<SecretMetadata> = match secret_type {
            Some(secret_type) => vec![self.store.require_metadata(secret_type).await?],
            None => self.store.list_metadata().await?,
        };

        let outcomes = join_all(targets.iter().map(|metadata| self.refresh_one(metadata, actor))).await;
        let refreshed: Vec<SecretType> = targets
            .iter()
            .zip(outcomes)
            .filter_map(|(metadata, refreshed)| refreshed.then_some(metadata.secret_type))
            .collect();

        info!(requested = targets.len(), refreshed = refreshed.len(), "Secret cache refresh complete");
        Ok(refreshed)
    }

    async fn refresh_one(&self, metadata: &SecretMetadata, actor: &Actor) -> bool {
        let started = Instant::now();
        let (origin, outcome) = self.cache.refresh_with_origin(metadata).await;
        match outcome {
            Ok(entry) if entry.source == CacheSource::Vault => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                if origin == FetchOrigin::Started {
                    self.metrics
                        .record_vault_fetch_duration(metadata.secret_type, elapsed_ms as f64 / 1000.0);
                }
                self.on_success(metadata, &entry, AccessAction::Refresh, actor, elapsed_ms).await;
                true
            }
            Ok(_) => {
                debug!(secret_type = %metadata.secret_type, "Refresh skipped, break-glass active");
                false
            }
            Err(err) => {
                self.on_failure(metadata, AccessAction::Refresh, actor, &err, origin).await;
                false
            }
        }
    }

    async fn on_success(
        &self,
        metadata: &SecretMetadata,
        entry: &CachedSecret,
        action: AccessAction,
        actor: &Actor,
        duration_ms: u64,
    ) {
        let secret_type = metadata.secret_type;
        let now = self.clock.now();

        self.alerts.reset_failure(secret_type);
        self.metrics.record_secret_read(secret_type, Some(entry.source), true);
        self.metrics.set_cache_age(secret_type, entry.age_seconds(now) as f64);

        // An override that lapsed at read time leaves its marks on the record
        let lapsed_override =
            entry.source != CacheSource::BreakGlass && metadata.break_glass_enabled_until.is_some();
        if lapsed_override {
            self.sync_metadata(
                secret_type,
                MetadataUpdate::new()
                    .cache_state(entry.source, entry.version.clone())
                    .break_glass_until(None),
            )
            .await;
        } else if metadata.cache_source != entry.source || metadata.cache_version != entry.version {
            self.sync_cache_state(secret_type, entry.source, entry.version.clone()).await;
        }

        let event = AccessEvent::success(secret_type, action, actor, now)
            .with_vault_version(entry.version.clone())
            .with_duration_ms(duration_ms);
        self.record(event).await;
    }

    async fn on_failure(
        &self,
        metadata: &SecretMetadata,
        action: AccessAction,
        actor: &Actor,
        err: &SecretsError,
        origin: FetchOrigin,
    ) {
        let secret_type = metadata.secret_type;
        self.metrics.record_secret_read(secret_type, None, false);

        // One vault failure counts once, however many callers shared the fetch.
        // Reads answered by a live sentinel are not counted again.
        if origin == FetchOrigin::Started {
            self.alerts.record_cache_failure(secret_type, &err.to_string());
            if self.cache.get_cached(secret_type).is_none() {
                let sentinel = self.cache.mark_empty(secret_type);
                if metadata.cache_source != sentinel.source {
                    self.sync_cache_state(secret_type, sentinel.source, None).await;
                }
            }
        }

        let event = AccessEvent::failure(secret_type, action, actor, err, self.clock.now());
        self.record(event).await;
    }

    async fn sync_cache_state(&self, secret_type: SecretType, source: CacheSource, version: Option<String>) {
        self.sync_metadata(secret_type, MetadataUpdate::new().cache_state(source, version)).await;
    }

    async fn sync_metadata(&self, secret_type: SecretType, update: MetadataUpdate) {
        if let Err(err) = self.store.update_metadata(secret_type, update).await {
            error!(secret_type = %secret_type, error = %err, "Failed to update cache state on metadata");
        }
    }

    async fn record(&self, event: AccessEvent) {
        let secret_type = event.secret_type;
        if let Err(err) = self.store.record_access_event(event).await {
            error!(secret_type = %secret_type, error = %err, "Failed to record access event");
        }
    }
}
