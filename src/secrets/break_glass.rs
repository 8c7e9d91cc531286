//! Emergency break-glass overrides.
//!
//! An operator supplies an encrypted replacement value with an expiry at most
//! [`MAX_BREAK_GLASS_TTL_MINUTES`] minutes away. The value goes straight into
//! the cache, bypassing the vault, and stays there until it expires or is
//! cleared.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::alerts::AlertSink;
use super::cache::SecretCache;
use super::clock::SharedClock;
use super::envelope::EnvelopeCipher;
use super::error::{Result, SecretsError};
use super::metadata::{AccessAction, AccessEvent, MetadataStore, MetadataUpdate};
use super::types::{Actor, CacheSource, SecretString, SecretType};

/// Longest allowed break-glass window.
pub const MAX_BREAK_GLASS_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct BreakGlassRequest {
    pub secret_type: SecretType,
    /// Sealed envelope, see [`EnvelopeCipher`]
    pub ciphertext: String,
    pub expires_at: DateTime<Utc>,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakGlassApplied {
    pub secret_type: SecretType,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct BreakGlassManager {
    cache: SecretCache,
    store: Arc<dyn MetadataStore>,
    cipher: Option<EnvelopeCipher>,
    alerts: Arc<AlertSink>,
    clock: SharedClock,
    max_ttl: Duration,
}

impl BreakGlassManager {
    /// `cipher` is `None` when no break-glass key is configured; every apply
    /// then fails with a configuration error.
    pub fn new(
        cache: SecretCache,
        store: Arc<dyn MetadataStore>,
        cipher: Option<EnvelopeCipher>,
        alerts: Arc<AlertSink>,
        clock: SharedClock,
    ) -> Self {
        Self {
            cache,
            store,
            cipher,
            alerts,
            clock,
            max_ttl: Duration::minutes(MAX_BREAK_GLASS_TTL_MINUTES),
        }
    }

    /// Validate and install an override.
    ///
    /// Payload and TTL are checked before anything is mutated. The alert sink
    /// hears about every attempt.
    #[instrument(skip(self, request), fields(secret_type = %request.secret_type, actor_id = %request.actor.actor_id))]
    pub async fn apply_break_glass(&self, request: BreakGlassRequest) -> Result<BreakGlassApplied> {
        let BreakGlassRequest { secret_type, ciphertext, expires_at, actor } = request;

        let outcome = self.install(secret_type, &ciphertext, expires_at).await;
        let now = self.clock.now();

        self.alerts.record_break_glass(secret_type, expires_at, &actor.actor_id, outcome.as_ref().err());

        let event = match &outcome {
            Ok(_) => AccessEvent::success(secret_type, AccessAction::BreakGlassApply, &actor, now),
            Err(err) => {
                AccessEvent::failure(secret_type, AccessAction::BreakGlassApply, &actor, err, now)
            }
        };
        self.record(event).await;

        outcome.map(|_| BreakGlassApplied { secret_type, expires_at })
    }

    async fn install(
        &self,
        secret_type: SecretType,
        ciphertext: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| SecretsError::config("break-glass key is not configured"))?;
        let plaintext: SecretString = cipher.open(ciphertext)?;

        let now = self.clock.now();
        if expires_at <= now {
            return Err(SecretsError::invalid_ttl("expiresAt must be in the future"));
        }
        let ttl = expires_at - now;
        if ttl > self.max_ttl {
            return Err(SecretsError::invalid_ttl(format!(
                "expiresAt may be at most {} minutes away",
                self.max_ttl.num_minutes()
            )));
        }

        self.store.require_metadata(secret_type).await?;
        self.store
            .update_metadata(
                secret_type,
                MetadataUpdate::new()
                    .break_glass_until(Some(expires_at))
                    .cache_state(CacheSource::BreakGlass, None),
            )
            .await?;

        self.cache.set_break_glass(secret_type, plaintext, ttl);
        Ok(())
    }

    /// Remove an override. Idempotent; returns whether one was removed from
    /// the cache. Vault-sourced cache entries are left alone.
    #[instrument(skip(self, actor), fields(actor_id = %actor.actor_id))]
    pub async fn clear_break_glass(&self, secret_type: SecretType, actor: &Actor) -> Result<bool> {
        let metadata = self.store.require_metadata(secret_type).await?;
        let removed = self.cache.clear_break_glass(secret_type);

        let mut update = MetadataUpdate::new().break_glass_until(None);
        if metadata.cache_source == CacheSource::BreakGlass {
            update = update.cache_state(CacheSource::Empty, None);
        }
        let outcome = self.store.update_metadata(secret_type, update).await;

        let now = self.clock.now();
        let event = match &outcome {
            Ok(_) => AccessEvent::success(secret_type, AccessAction::BreakGlassClear, actor, now),
            Err(err) => {
                AccessEvent::failure(secret_type, AccessAction::BreakGlassClear, actor, err, now)
            }
        };
        self.record(event).await;

        outcome?;
        info!(secret_type = %secret_type, removed, "Break-glass override cleared");
        Ok(removed)
    }

    async fn record(&self, event: AccessEvent) {
        let secret_type = event.secret_type;
        if let Err(err) = self.store.record_access_event(event).await {
            error!(secret_type = %secret_type, error = %err, "Failed to record access event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRecorder;
    use crate::secrets::clock::{Clock, ManualClock};
    use crate::secrets::metadata::{seed_catalog, AccessResult, InMemoryMetadataStore};
    use crate::secrets::vault::{VaultClient, VaultSecret};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct UnreachableVault;

    #[async_trait]
    impl VaultClient for UnreachableVault {
        async fn access_secret_version(&self, _: &str, _: &str) -> Result<VaultSecret> {
            Err(SecretsError::vault("unreachable"))
        }
    }

    struct Fixture {
        manager: BreakGlassManager,
        cache: SecretCache,
        store: Arc<InMemoryMetadataStore>,
        cipher: EnvelopeCipher,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let store = Arc::new(InMemoryMetadataStore::new(
            seed_catalog("test", "trading/", Duration::days(90), clock.now()),
            shared.clone(),
        ));
        let cache = SecretCache::new(Arc::new(UnreachableVault), shared.clone(), Default::default());
        let alerts = Arc::new(AlertSink::new(3, MetricsRecorder::new(), shared.clone()));
        let cipher = EnvelopeCipher::for_testing();
        let manager = BreakGlassManager::new(
            cache.clone(),
            store.clone(),
            Some(cipher.clone()),
            alerts,
            shared,
        );
        Fixture { manager, cache, store, cipher, clock }
    }

    fn request(f: &Fixture, expires_in: Duration) -> BreakGlassRequest {
        BreakGlassRequest {
            secret_type: SecretType::TradingApiKey,
            ciphertext: f.cipher.seal("override").unwrap(),
            expires_at: f.clock.now() + expires_in,
            actor: Actor::operator("alice"),
        }
    }

    #[tokio::test]
    async fn test_apply_installs_override() {
        let f = fixture();
        let applied = f.manager.apply_break_glass(request(&f, Duration::minutes(20))).await.unwrap();
        assert_eq!(applied.secret_type, SecretType::TradingApiKey);

        let entry = f.cache.get_cached(SecretType::TradingApiKey).unwrap();
        assert_eq!(entry.source, CacheSource::BreakGlass);
        assert_eq!(entry.value.expose_secret(), "override");
        assert_eq!(entry.expires_at, applied.expires_at);

        let record = f.store.require_metadata(SecretType::TradingApiKey).await.unwrap();
        assert_eq!(record.break_glass_enabled_until, Some(applied.expires_at));
        assert_eq!(record.cache_source, CacheSource::BreakGlass);

        let events = f.store.access_events().await;
        assert_eq!(events[0].action, AccessAction::BreakGlassApply);
        assert_eq!(events[0].result, AccessResult::Success);
    }

    #[tokio::test]
    async fn test_ttl_bounds() {
        let f = fixture();
        let before = f.store.require_metadata(SecretType::TradingApiKey).await.unwrap();

        for expires_in in [Duration::minutes(61), Duration::minutes(31), Duration::zero(), Duration::minutes(-1)] {
            let err = f.manager.apply_break_glass(request(&f, expires_in)).await.unwrap_err();
            assert!(matches!(err, SecretsError::InvalidBreakGlassTtl { .. }), "{:?}", expires_in);
        }

        assert!(f.cache.get_cached(SecretType::TradingApiKey).is_none());
        assert_eq!(f.store.require_metadata(SecretType::TradingApiKey).await.unwrap(), before);

        f.manager.apply_break_glass(request(&f, Duration::minutes(30))).await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_payload_checked_before_ttl() {
        let f = fixture();
        let mut bad = request(&f, Duration::minutes(90));
        bad.ciphertext = "garbage".to_string();

        let err = f.manager.apply_break_glass(bad).await.unwrap_err();
        assert!(matches!(err, SecretsError::InvalidBreakGlassPayload { .. }));
        assert!(f.cache.get_cached(SecretType::TradingApiKey).is_none());

        let events = f.store.access_events().await;
        assert_eq!(events[0].error_code.as_deref(), Some("invalid_break_glass_payload"));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let f = fixture();
        let manager = BreakGlassManager::new(
            f.cache.clone(),
            f.store.clone(),
            None,
            Arc::new(AlertSink::new(3, MetricsRecorder::new(), Arc::new(f.clock.clone()))),
            Arc::new(f.clock.clone()),
        );
        let err = manager.apply_break_glass(request(&f, Duration::minutes(5))).await.unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let f = fixture();
        let actor = Actor::operator("alice");
        f.manager.apply_break_glass(request(&f, Duration::minutes(10))).await.unwrap();

        assert!(f.manager.clear_break_glass(SecretType::TradingApiKey, &actor).await.unwrap());
        assert!(!f.manager.clear_break_glass(SecretType::TradingApiKey, &actor).await.unwrap());

        assert!(f.cache.get_cached(SecretType::TradingApiKey).is_none());
        let record = f.store.require_metadata(SecretType::TradingApiKey).await.unwrap();
        assert!(record.break_glass_enabled_until.is_none());
        assert_eq!(record.cache_source, CacheSource::Empty);
    }
}
