//! Secret lifecycle management for the trading backend.
//!
//! Credentials live in an external vault. This module keeps a short-lived
//! in-process cache in front of it and tracks lifecycle metadata for each
//! known [`SecretType`].
//!
//! # Components
//!
//! - [`SecretCache`]: TTL cache with single-flight vault fetches
//! - [`SecretManager`]: audited reads and refreshes on top of the cache
//! - [`RotationCoordinator`]: validates candidate vault versions, one at a time per type
//! - [`BreakGlassManager`]: time-boxed operator overrides from sealed envelopes
//! - [`StatusAggregator`]: merged metadata and cache view for operators
//! - [`AlertSink`]: consecutive-failure counting and escalation
//! - [`RotationMonitor`]: background sweep for overdue rotations
//!
//! [`SecretLifecycle`] wires all of them over one shared cache and store.
//!
//! # Example
//!
//! ```rust,ignore
//! use secretops::secrets::{Actor, SecretType};
//!
//! let entry = lifecycle.manager.read_secret(SecretType::TradingApiKey, &Actor::service("pricer")).await?;
//! sign_request(entry.value.expose_secret());
//! ```
//!
//! Secret values are carried as [`SecretString`], which redacts itself in
//! `Debug` and `Display` and zeroizes on drop.

pub mod alerts;
pub mod break_glass;
pub mod cache;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
pub mod monitor;
pub mod rotation;
pub mod status;
pub mod types;
pub mod vault;

pub use alerts::{AlertSink, Escalation, DEFAULT_ALERT_THRESHOLD};
pub use break_glass::{
    BreakGlassApplied, BreakGlassManager, BreakGlassRequest, MAX_BREAK_GLASS_TTL_MINUTES,
};
pub use cache::{CacheSettings, CachedSecret, FetchOrigin, SecretCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use envelope::EnvelopeCipher;
pub use error::{Result, SecretsError};
pub use lifecycle::{LifecycleSettings, SecretLifecycle};
pub use manager::SecretManager;
pub use metadata::{
    seed_catalog, AccessAction, AccessEvent, AccessResult, InMemoryMetadataStore, MetadataStore,
    MetadataUpdate, SecretMetadata,
};
pub use monitor::{OverdueRotation, RotationMonitor, RotationMonitorHandle, DEFAULT_MONITOR_INTERVAL};
pub use rotation::{RotationCoordinator, RotationPreview};
pub use status::{StatusAggregator, StatusEntry, StatusReport};
pub use types::{Actor, ActorType, CacheSource, RotationStatus, SecretString, SecretType};
pub use vault::{KvVaultClient, VaultClient, VaultConfig, VaultSecret, VersionAlias};
