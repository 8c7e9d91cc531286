//! Secret metadata records, the access-event audit trail, and the store boundary.
//!
//! The store holds exactly one [`SecretMetadata`] per [`SecretType`] and an
//! append-only list of [`AccessEvent`]s. [`InMemoryMetadataStore`] is the
//! reference implementation; relational backends implement the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::clock::SharedClock;
use super::error::{Result, SecretsError};
use super::types::{Actor, ActorType, CacheSource, RotationStatus, SecretType};

/// Lifecycle metadata for one secret type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretMetadata {
    pub secret_type: SecretType,
    pub environment: String,
    pub vault_resource_id: String,
    pub vault_version_alias: String,
    pub status: RotationStatus,
    pub rotation_due_at: DateTime<Utc>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub owner: Option<String>,
    /// Present only while a break-glass override is installed
    pub break_glass_enabled_until: Option<DateTime<Utc>>,
    /// Last cache state written by a read, refresh or break-glass action.
    /// After an override lapses on its own this keeps saying `break_glass`
    /// until the next read; the status view reads the live cache instead.
    pub cache_source: CacheSource,
    pub cache_version: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecretMetadata {
    pub fn new(
        secret_type: SecretType,
        environment: impl Into<String>,
        vault_resource_id: impl Into<String>,
        rotation_due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            secret_type,
            environment: environment.into(),
            vault_resource_id: vault_resource_id.into(),
            vault_version_alias: "latest".to_string(),
            status: RotationStatus::Active,
            rotation_due_at,
            last_rotated_at: None,
            last_validated_at: None,
            owner: None,
            break_glass_enabled_until: None,
            cache_source: CacheSource::Empty,
            cache_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_rotation_overdue(&self, now: DateTime<Utc>) -> bool {
        self.rotation_due_at < now
    }

    /// Break-glass expiry, if an override is still in force at `now`.
    pub fn active_break_glass_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.break_glass_enabled_until.filter(|until| *until > now)
    }
}

/// Partial update applied by [`MetadataStore::update_metadata`].
///
/// `None` leaves a field untouched; for clearable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub status: Option<RotationStatus>,
    pub vault_version_alias: Option<String>,
    pub rotation_due_at: Option<DateTime<Utc>>,
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub owner: Option<Option<String>>,
    pub break_glass_enabled_until: Option<Option<DateTime<Utc>>>,
    pub cache_source: Option<CacheSource>,
    pub cache_version: Option<Option<String>>,
}

impl MetadataUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: RotationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn last_validated_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_validated_at = Some(at);
        self
    }

    pub fn break_glass_until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.break_glass_enabled_until = Some(until);
        self
    }

    pub fn cache_state(mut self, source: CacheSource, version: Option<String>) -> Self {
        self.cache_source = Some(source);
        self.cache_version = Some(version);
        self
    }

    fn apply(self, record: &mut SecretMetadata, now: DateTime<Utc>) -> Result<()> {
        if let Some(next) = self.status {
            if !record.status.can_transition_to(next) {
                return Err(SecretsError::InvalidStatusTransition {
                    secret_type: record.secret_type,
                    from: record.status,
                    to: next,
                });
            }
            record.status = next;
        }
        if let Some(alias) = self.vault_version_alias {
            record.vault_version_alias = alias;
        }
        if let Some(due) = self.rotation_due_at {
            record.rotation_due_at = due;
        }
        if let Some(at) = self.last_rotated_at {
            record.last_rotated_at = Some(at);
        }
        if let Some(at) = self.last_validated_at {
            record.last_validated_at = Some(at);
        }
        if let Some(owner) = self.owner {
            record.owner = owner;
        }
        if let Some(until) = self.break_glass_enabled_until {
            record.break_glass_enabled_until = until;
        }
        if let Some(source) = self.cache_source {
            record.cache_source = source;
        }
        if let Some(version) = self.cache_version {
            record.cache_version = version;
        }
        record.updated_at = now;
        Ok(())
    }
}

/// Action recorded on an access event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Read,
    Refresh,
    RotationPreview,
    BreakGlassApply,
    BreakGlassClear,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Refresh => "refresh",
            Self::RotationPreview => "rotation_preview",
            Self::BreakGlassApply => "break_glass_apply",
            Self::BreakGlassClear => "break_glass_clear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessResult {
    Success,
    Failure,
}

/// Immutable audit record of one secret access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub id: Uuid,
    pub secret_type: SecretType,
    pub action: AccessAction,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub result: AccessResult,
    pub error_code: Option<String>,
    pub vault_version: Option<String>,
    pub duration_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl AccessEvent {
    pub fn success(
        secret_type: SecretType,
        action: AccessAction,
        actor: &Actor,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            secret_type,
            action,
            actor_type: actor.actor_type,
            actor_id: actor.actor_id.clone(),
            result: AccessResult::Success,
            error_code: None,
            vault_version: None,
            duration_ms: None,
            recorded_at,
        }
    }

    pub fn failure(
        secret_type: SecretType,
        action: AccessAction,
        actor: &Actor,
        error: &SecretsError,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            result: AccessResult::Failure,
            error_code: Some(error.error_code().to_string()),
            ..Self::success(secret_type, action, actor, recorded_at)
        }
    }

    pub fn with_vault_version(mut self, version: Option<String>) -> Self {
        self.vault_version = version;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Persistence boundary for secret metadata and access events.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    async fn list_metadata(&self) -> Result<Vec<SecretMetadata>>;

    async fn get_metadata(&self, secret_type: SecretType) -> Result<Option<SecretMetadata>>;

    /// Apply a partial update. Rejects illegal status transitions without
    /// changing the record.
    async fn update_metadata(
        &self,
        secret_type: SecretType,
        update: MetadataUpdate,
    ) -> Result<SecretMetadata>;

    /// Append an access event. Events are never mutated or deleted.
    async fn record_access_event(&self, event: AccessEvent) -> Result<()>;

    /// Metadata for `secret_type`, failing with `NotFound` if absent.
    async fn require_metadata(&self, secret_type: SecretType) -> Result<SecretMetadata> {
        self.get_metadata(secret_type).await?.ok_or(SecretsError::NotFound { secret_type })
    }
}

/// Build the bootstrap catalog: one record per known secret type.
///
/// Vault resource ids are `<prefix><secret-type>`.
pub fn seed_catalog(
    environment: &str,
    resource_prefix: &str,
    rotation_interval: Duration,
    now: DateTime<Utc>,
) -> Vec<SecretMetadata> {
    SecretType::ALL
        .into_iter()
        .map(|secret_type| {
            SecretMetadata::new(
                secret_type,
                environment,
                format!("{}{}", resource_prefix, secret_type.as_str()),
                now + rotation_interval,
                now,
            )
        })
        .collect()
}

/// In-process metadata store.
#[derive(Debug, Clone)]
pub struct InMemoryMetadataStore {
    records: Arc<RwLock<BTreeMap<SecretType, SecretMetadata>>>,
    events: Arc<RwLock<Vec<AccessEvent>>>,
    clock: SharedClock,
}

impl InMemoryMetadataStore {
    /// Creates a store holding `records`. A later record for the same secret
    /// type replaces an earlier one, so the store never holds duplicates.
    pub fn new(records: Vec<SecretMetadata>, clock: SharedClock) -> Self {
        let records = records.into_iter().map(|r| (r.secret_type, r)).collect();
        Self {
            records: Arc::new(RwLock::new(records)),
            events: Arc::new(RwLock::new(Vec::new())),
            clock,
        }
    }

    /// Snapshot of all recorded access events, oldest first.
    pub async fn access_events(&self) -> Vec<AccessEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn list_metadata(&self) -> Result<Vec<SecretMetadata>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn get_metadata(&self, secret_type: SecretType) -> Result<Option<SecretMetadata>> {
        Ok(self.records.read().await.get(&secret_type).cloned())
    }

    async fn update_metadata(
        &self,
        secret_type: SecretType,
        update: MetadataUpdate,
    ) -> Result<SecretMetadata> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&secret_type).ok_or(SecretsError::NotFound { secret_type })?;

        // Apply to a copy so a rejected transition leaves the record untouched.
        let mut next = record.clone();
        update.apply(&mut next, self.clock.now())?;
        *record = next.clone();

        debug!(secret_type = %secret_type, status = %next.status, "Updated secret metadata");
        Ok(next)
    }

    async fn record_access_event(&self, event: AccessEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::clock::{Clock, ManualClock};

    fn store_with_catalog() -> (InMemoryMetadataStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let catalog = seed_catalog("test", "trading/", Duration::days(90), clock.now());
        (InMemoryMetadataStore::new(catalog, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_seed_catalog_has_one_record_per_type() {
        let (store, _) = store_with_catalog();
        let records = store.list_metadata().await.unwrap();

        assert_eq!(records.len(), SecretType::ALL.len());
        for secret_type in SecretType::ALL {
            let record = store.require_metadata(secret_type).await.unwrap();
            assert_eq!(record.vault_resource_id, format!("trading/{}", secret_type));
            assert_eq!(record.status, RotationStatus::Active);
            assert_eq!(record.cache_source, CacheSource::Empty);
        }
    }

    #[tokio::test]
    async fn test_duplicate_records_collapse() {
        let clock = ManualClock::starting_now();
        let now = clock.now();
        let first = SecretMetadata::new(SecretType::SigningSeed, "a", "one", now, now);
        let second = SecretMetadata::new(SecretType::SigningSeed, "a", "two", now, now);
        let store = InMemoryMetadataStore::new(vec![first, second], Arc::new(clock));

        let records = store.list_metadata().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vault_resource_id, "two");
    }

    #[tokio::test]
    async fn test_update_applies_partial_fields() {
        let (store, clock) = store_with_catalog();
        clock.advance(Duration::minutes(5));
        let validated_at = clock.now();

        let updated = store
            .update_metadata(
                SecretType::TradingApiKey,
                MetadataUpdate::new()
                    .status(RotationStatus::Rotating)
                    .last_validated_at(validated_at)
                    .cache_state(CacheSource::Vault, Some("3".to_string())),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, RotationStatus::Rotating);
        assert_eq!(updated.last_validated_at, Some(validated_at));
        assert_eq!(updated.cache_version.as_deref(), Some("3"));
        assert_eq!(updated.updated_at, validated_at);
        assert!(updated.owner.is_none());
    }

    #[tokio::test]
    async fn test_deprecated_is_terminal() {
        let (store, _) = store_with_catalog();
        store
            .update_metadata(
                SecretType::SigningSeed,
                MetadataUpdate::new().status(RotationStatus::Deprecated),
            )
            .await
            .unwrap();

        let err = store
            .update_metadata(
                SecretType::SigningSeed,
                MetadataUpdate::new()
                    .status(RotationStatus::Active)
                    .cache_state(CacheSource::Vault, Some("9".to_string())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::InvalidStatusTransition { .. }));

        // Rejected update leaves the whole record untouched
        let record = store.require_metadata(SecretType::SigningSeed).await.unwrap();
        assert_eq!(record.status, RotationStatus::Deprecated);
        assert_eq!(record.cache_source, CacheSource::Empty);
    }

    #[tokio::test]
    async fn test_break_glass_field_clears() {
        let (store, clock) = store_with_catalog();
        let until = clock.now() + Duration::minutes(10);

        let set = store
            .update_metadata(
                SecretType::WebhookSharedSecret,
                MetadataUpdate::new().break_glass_until(Some(until)),
            )
            .await
            .unwrap();
        assert_eq!(set.active_break_glass_until(clock.now()), Some(until));

        clock.advance(Duration::minutes(11));
        assert_eq!(set.active_break_glass_until(clock.now()), None);

        let cleared = store
            .update_metadata(
                SecretType::WebhookSharedSecret,
                MetadataUpdate::new().break_glass_until(None),
            )
            .await
            .unwrap();
        assert!(cleared.break_glass_enabled_until.is_none());
    }

    #[tokio::test]
    async fn test_access_events_append_only() {
        let (store, clock) = store_with_catalog();
        let actor = Actor::operator("alice");

        store
            .record_access_event(AccessEvent::success(
                SecretType::TradingApiKey,
                AccessAction::Read,
                &actor,
                clock.now(),
            ))
            .await
            .unwrap();
        store
            .record_access_event(AccessEvent::failure(
                SecretType::TradingApiKey,
                AccessAction::Read,
                &actor,
                &SecretsError::unavailable(SecretType::TradingApiKey, "down"),
                clock.now(),
            ))
            .await
            .unwrap();

        let events = store.access_events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].result, AccessResult::Success);
        assert_eq!(events[1].error_code.as_deref(), Some("secret_unavailable"));
        assert_eq!(events[1].actor_id, "alice");
    }

    #[tokio::test]
    async fn test_update_unknown_type_is_not_found() {
        let clock = ManualClock::starting_now();
        let store = InMemoryMetadataStore::new(Vec::new(), Arc::new(clock));
        let err = store
            .update_metadata(SecretType::SigningSeed, MetadataUpdate::new())
            .await
            .unwrap_err();
        assert_eq!(err, SecretsError::NotFound { secret_type: SecretType::SigningSeed });
    }
}
