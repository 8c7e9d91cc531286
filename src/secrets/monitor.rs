//! Periodic sweep for overdue rotations.
//!
//! Runs once at startup and then on a fixed interval, logging a warning for
//! every secret type whose rotation deadline has passed. The sweep only reads
//! metadata.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clock::SharedClock;
use super::error::Result;
use super::metadata::MetadataStore;
use super::types::SecretType;
use crate::observability::MetricsRecorder;

/// Default sweep interval (15 minutes).
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// A secret type found past its rotation deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverdueRotation {
    pub secret_type: SecretType,
    pub rotation_due_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RotationMonitor {
    store: Arc<dyn MetadataStore>,
    clock: SharedClock,
    metrics: MetricsRecorder,
    interval: Duration,
}

impl RotationMonitor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        clock: SharedClock,
        metrics: MetricsRecorder,
        interval: Duration,
    ) -> Self {
        Self { store, clock, metrics, interval }
    }

    /// Check every record once.
    pub async fn sweep(&self) -> Result<Vec<OverdueRotation>> {
        let now = self.clock.now();
        let overdue: Vec<OverdueRotation> = self
            .store
            .list_metadata()
            .await?
            .into_iter()
            .filter(|record| record.is_rotation_overdue(now))
            .map(|record| OverdueRotation {
                secret_type: record.secret_type,
                rotation_due_at: record.rotation_due_at,
            })
            .collect();

        for item in &overdue {
            warn!(
                secret_type = %item.secret_type,
                rotation_due_at = %item.rotation_due_at,
                "Secret rotation overdue"
            );
            self.metrics.record_rotation_overdue(item.secret_type);
        }
        debug!(overdue = overdue.len(), "Rotation sweep complete");

        Ok(overdue)
    }

    /// Start sweeping in the background until the handle is stopped.
    pub fn spawn(self) -> RotationMonitorHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Rotation monitor started");

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = self.sweep().await {
                            error!(error = %err, "Rotation sweep failed");
                        }
                    }
                }
            }

            info!("Rotation monitor stopped");
        });

        RotationMonitorHandle { token, task }
    }
}

/// Stops a running [`RotationMonitor`].
#[derive(Debug)]
pub struct RotationMonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RotationMonitorHandle {
    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            error!(error = %err, "Rotation monitor task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::clock::{Clock, ManualClock};
    use crate::secrets::metadata::{
        seed_catalog, AccessEvent, InMemoryMetadataStore, MetadataUpdate, SecretMetadata,
    };
    use crate::secrets::types::RotationStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    fn monitor_with(clock: &ManualClock) -> (RotationMonitor, Arc<InMemoryMetadataStore>) {
        let mut catalog = seed_catalog("test", "trading/", chrono::Duration::days(30), clock.now());
        catalog[0].rotation_due_at = clock.now() - chrono::Duration::days(1);
        let store = Arc::new(InMemoryMetadataStore::new(catalog, Arc::new(clock.clone())));
        let monitor = RotationMonitor::new(
            store.clone(),
            Arc::new(clock.clone()),
            MetricsRecorder::new(),
            Duration::from_secs(60),
        );
        (monitor, store)
    }

    #[tokio::test]
    async fn test_sweep_reports_overdue_without_mutation() {
        let clock = ManualClock::starting_now();
        let (monitor, store) = monitor_with(&clock);
        let before = store.list_metadata().await.unwrap();

        let overdue = monitor.sweep().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].secret_type, SecretType::TradingApiKey);
        assert_eq!(store.list_metadata().await.unwrap(), before);

        clock.advance(chrono::Duration::days(31));
        assert_eq!(monitor.sweep().await.unwrap().len(), SecretType::ALL.len());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_sweep_logs_warning_per_overdue_type() {
        let clock = ManualClock::starting_now();
        let (monitor, _) = monitor_with(&clock);

        monitor.sweep().await.unwrap();
        assert!(logs_contain("Secret rotation overdue"));
        assert!(logs_contain("trading-api-key"));
        assert!(!logs_contain("signing-seed"));
    }

    #[tokio::test]
    async fn test_sweep_includes_deprecated_records() {
        let clock = ManualClock::starting_now();
        let (monitor, store) = monitor_with(&clock);
        store
            .update_metadata(
                SecretType::TradingApiKey,
                MetadataUpdate::new().status(RotationStatus::Deprecated),
            )
            .await
            .unwrap();

        let overdue = monitor.sweep().await.unwrap();
        assert_eq!(overdue.len(), 1);
    }

    #[derive(Debug)]
    struct CountingStore {
        inner: Arc<InMemoryMetadataStore>,
        sweeps: AtomicUsize,
    }

    impl CountingStore {
        fn sweeps(&self) -> usize {
            self.sweeps.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetadataStore for CountingStore {
        async fn list_metadata(&self) -> Result<Vec<SecretMetadata>> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            self.inner.list_metadata().await
        }

        async fn get_metadata(&self, secret_type: SecretType) -> Result<Option<SecretMetadata>> {
            self.inner.get_metadata(secret_type).await
        }

        async fn update_metadata(
            &self,
            secret_type: SecretType,
            update: MetadataUpdate,
        ) -> Result<SecretMetadata> {
            self.inner.update_metadata(secret_type, update).await
        }

        async fn record_access_event(&self, event: AccessEvent) -> Result<()> {
            self.inner.record_access_event(event).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_sweeps_at_start_then_per_interval() {
        let clock = ManualClock::starting_now();
        let (_, inner) = monitor_with(&clock);
        let store = Arc::new(CountingStore { inner, sweeps: AtomicUsize::new(0) });
        let monitor = RotationMonitor::new(
            store.clone(),
            Arc::new(clock.clone()),
            MetricsRecorder::new(),
            Duration::from_secs(60),
        );
        let started = tokio::time::Instant::now();

        let handle = monitor.spawn();
        while store.sweeps() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(store.sweeps(), 1);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(store.sweeps(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.sweeps(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.sweeps(), 3);
        assert!(!handle.is_finished());

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.sweeps(), 3);
    }
}
