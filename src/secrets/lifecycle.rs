//! Wiring for the secret lifecycle services.

use std::sync::Arc;
use std::time::Duration;

use super::alerts::AlertSink;
use super::break_glass::BreakGlassManager;
use super::cache::{CacheSettings, SecretCache};
use super::clock::SharedClock;
use super::envelope::EnvelopeCipher;
use super::manager::SecretManager;
use super::metadata::MetadataStore;
use super::monitor::RotationMonitor;
use super::rotation::RotationCoordinator;
use super::status::StatusAggregator;
use super::vault::VaultClient;
use crate::observability::MetricsRecorder;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub cache: CacheSettings,
    pub alert_threshold: u32,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self { cache: CacheSettings::default(), alert_threshold: super::alerts::DEFAULT_ALERT_THRESHOLD }
    }
}

/// Every lifecycle service, sharing one cache, store, alert sink and clock.
#[derive(Debug, Clone)]
pub struct SecretLifecycle {
    pub cache: SecretCache,
    pub store: Arc<dyn MetadataStore>,
    pub alerts: Arc<AlertSink>,
    pub manager: Arc<SecretManager>,
    pub rotation: Arc<RotationCoordinator>,
    pub break_glass: Arc<BreakGlassManager>,
    pub status: Arc<StatusAggregator>,
    clock: SharedClock,
    metrics: MetricsRecorder,
}

impl SecretLifecycle {
    pub fn new(
        vault: Arc<dyn VaultClient>,
        store: Arc<dyn MetadataStore>,
        cipher: Option<EnvelopeCipher>,
        settings: LifecycleSettings,
        clock: SharedClock,
        metrics: MetricsRecorder,
    ) -> Self {
        let cache = SecretCache::new(vault.clone(), clock.clone(), settings.cache);
        let alerts = Arc::new(AlertSink::new(settings.alert_threshold, metrics.clone(), clock.clone()));

        let manager = Arc::new(SecretManager::new(
            cache.clone(),
            store.clone(),
            alerts.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let rotation = Arc::new(RotationCoordinator::new(
            vault,
            store.clone(),
            clock.clone(),
            metrics.clone(),
        ));
        let break_glass = Arc::new(BreakGlassManager::new(
            cache.clone(),
            store.clone(),
            cipher,
            alerts.clone(),
            clock.clone(),
        ));
        let status = Arc::new(StatusAggregator::new(
            cache.clone(),
            store.clone(),
            clock.clone(),
            metrics.clone(),
        ));

        Self { cache, store, alerts, manager, rotation, break_glass, status, clock, metrics }
    }

    /// A rotation monitor over the same store and clock. Not started.
    pub fn monitor(&self, interval: Duration) -> RotationMonitor {
        RotationMonitor::new(self.store.clone(), self.clock.clone(), self.metrics.clone(), interval)
    }
}
