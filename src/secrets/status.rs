//! Operator-facing status view.
//!
//! Merges each metadata record with the live cache entry for the same secret
//! type. Reads already-materialized state only; never contacts the vault.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};

use super::cache::SecretCache;
use super::clock::SharedClock;
use super::error::Result;
use super::metadata::MetadataStore;
use super::types::{CacheSource, RotationStatus, SecretType};
use crate::observability::MetricsRecorder;

/// Status of one secret type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub secret_type: SecretType,
    pub environment: String,
    pub status: RotationStatus,
    pub vault_resource_id: String,
    pub vault_version_alias: String,
    pub rotation_due_at: DateTime<Utc>,
    pub rotation_overdue: bool,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    /// `None` once the override has expired
    pub break_glass_enabled_until: Option<DateTime<Utc>>,
    pub cache_source: CacheSource,
    pub cache_version: Option<String>,
    pub cache_age_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub data: Vec<StatusEntry>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusAggregator {
    cache: SecretCache,
    store: Arc<dyn MetadataStore>,
    clock: SharedClock,
    metrics: MetricsRecorder,
}

impl StatusAggregator {
    pub fn new(
        cache: SecretCache,
        store: Arc<dyn MetadataStore>,
        clock: SharedClock,
        metrics: MetricsRecorder,
    ) -> Self {
        Self { cache, store, clock, metrics }
    }

    /// One entry per known secret type, in catalog order.
    #[instrument(skip(self))]
    pub async fn get_status(&self) -> Result<StatusReport> {
        let mut records: HashMap<SecretType, _> = self
            .store
            .list_metadata()
            .await?
            .into_iter()
            .map(|record| (record.secret_type, record))
            .collect();
        let now = self.clock.now();

        let mut data = Vec::with_capacity(SecretType::ALL.len());
        for secret_type in SecretType::ALL {
            let Some(record) = records.remove(&secret_type) else {
                warn!(secret_type = %secret_type, "No metadata record for secret type");
                continue;
            };

            let cached = self.cache.get_cached(secret_type);
            let cache_age_seconds = cached.as_ref().map(|entry| entry.age_seconds(now));
            if let Some(age) = cache_age_seconds {
                self.metrics.set_cache_age(secret_type, age as f64);
            }

            data.push(StatusEntry {
                secret_type,
                rotation_overdue: record.is_rotation_overdue(now),
                break_glass_enabled_until: record.active_break_glass_until(now),
                cache_source: cached.as_ref().map(|e| e.source).unwrap_or(CacheSource::Empty),
                cache_version: cached.and_then(|e| e.version),
                cache_age_seconds,
                environment: record.environment,
                status: record.status,
                vault_resource_id: record.vault_resource_id,
                vault_version_alias: record.vault_version_alias,
                rotation_due_at: record.rotation_due_at,
                last_rotated_at: record.last_rotated_at,
                last_validated_at: record.last_validated_at,
                owner: record.owner,
            });
        }

        Ok(StatusReport { data, updated_at: now })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::clock::{Clock, ManualClock};
    use crate::secrets::metadata::{seed_catalog, InMemoryMetadataStore, MetadataUpdate};
    use crate::secrets::types::SecretString;
    use crate::secrets::vault::{VaultClient, VaultSecret};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingVault {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VaultClient for CountingVault {
        async fn access_secret_version(&self, _: &str, _: &str) -> Result<VaultSecret> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(VaultSecret { value: SecretString::new("v"), version: "7".to_string(), duration_ms: 1 })
        }
    }

    #[tokio::test]
    async fn test_one_entry_per_type_without_vault_calls() {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let store = Arc::new(InMemoryMetadataStore::new(
            seed_catalog("prod", "trading/", Duration::days(90), clock.now()),
            shared.clone(),
        ));
        let vault = Arc::new(CountingVault::default());
        let cache = SecretCache::new(vault.clone(), shared.clone(), Default::default());

        let metadata = store.require_metadata(SecretType::SigningSeed).await.unwrap();
        cache.get_or_fetch(&metadata).await.unwrap();
        cache.set_break_glass(
            SecretType::TradingApiKey,
            SecretString::new("override"),
            Duration::minutes(5),
        );
        store
            .update_metadata(
                SecretType::TradingApiKey,
                MetadataUpdate::new().break_glass_until(Some(clock.now() + Duration::minutes(5))),
            )
            .await
            .unwrap();
        clock.advance(Duration::seconds(42));

        let aggregator =
            StatusAggregator::new(cache, store.clone(), shared, MetricsRecorder::new());
        let report = aggregator.get_status().await.unwrap();

        assert_eq!(vault.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.updated_at, clock.now());
        let types: Vec<_> = report.data.iter().map(|e| e.secret_type).collect();
        assert_eq!(types, SecretType::ALL.to_vec());

        let seed = &report.data[3];
        assert_eq!(seed.cache_source, CacheSource::Vault);
        assert_eq!(seed.cache_version.as_deref(), Some("7"));
        assert_eq!(seed.cache_age_seconds, Some(42));

        let api_key = &report.data[0];
        assert_eq!(api_key.cache_source, CacheSource::BreakGlass);
        assert!(api_key.break_glass_enabled_until.is_some());
        assert!(api_key.cache_version.is_none());

        let client_secret = &report.data[1];
        assert_eq!(client_secret.cache_source, CacheSource::Empty);
        assert_eq!(client_secret.cache_age_seconds, None);

        // Break-glass expiry is reported as absent once it passes
        clock.advance(Duration::minutes(10));
        let report = aggregator.get_status().await.unwrap();
        assert_eq!(report.data[0].cache_source, CacheSource::Empty);
        assert!(report.data[0].break_glass_enabled_until.is_none());
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let catalog: Vec<_> = seed_catalog("prod", "", Duration::days(1), clock.now())
            .into_iter()
            .filter(|r| r.secret_type != SecretType::SigningSeed)
            .collect();
        let store = Arc::new(InMemoryMetadataStore::new(catalog, shared.clone()));
        let cache =
            SecretCache::new(Arc::new(CountingVault::default()), shared.clone(), Default::default());

        let report = StatusAggregator::new(cache, store, shared, MetricsRecorder::new())
            .get_status()
            .await
            .unwrap();
        assert_eq!(report.data.len(), 3);
        assert!(report.data.iter().all(|e| e.secret_type != SecretType::SigningSeed));
    }

    #[tokio::test]
    async fn test_overdue_flag() {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let store = Arc::new(InMemoryMetadataStore::new(
            seed_catalog("prod", "", Duration::days(1), clock.now()),
            shared.clone(),
        ));
        let cache =
            SecretCache::new(Arc::new(CountingVault::default()), shared.clone(), Default::default());
        let aggregator = StatusAggregator::new(cache, store, shared, MetricsRecorder::new());

        assert!(aggregator.get_status().await.unwrap().data.iter().all(|e| !e.rotation_overdue));
        clock.advance(Duration::days(2));
        assert!(aggregator.get_status().await.unwrap().data.iter().all(|e| e.rotation_overdue));
    }
}
