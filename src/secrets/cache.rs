//! Time-bounded, single-flight secret cache.
//!
//! Holds at most one [`CachedSecret`] per [`SecretType`]. An entry is valid
//! while `expires_at > now`; expired entries are treated as absent.
//!
//! # Single flight
//!
//! Concurrent [`SecretCache::get_or_fetch`] calls for the same secret type
//! share one vault request. The first caller registers a shared fetch in the
//! in-flight table; later callers await the same handle and receive the same
//! outcome. The fetch runs on its own task, so it completes even if every
//! waiter goes away, and it removes its in-flight slot after the result has
//! been stored.
//!
//! # Break-glass precedence
//!
//! A live break-glass entry is never replaced by a vault fetch. It disappears
//! only when its expiry passes or [`SecretCache::clear_break_glass`] is called.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::clock::SharedClock;
use super::error::{Result, SecretsError};
use super::metadata::SecretMetadata;
use super::types::{CacheSource, SecretString, SecretType};
use super::vault::VaultClient;

/// Default lifetime of a vault-sourced entry.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;

/// Default lifetime of the `empty` failure sentinel.
pub const DEFAULT_EMPTY_TTL_SECS: i64 = 30;

/// The currently usable value of one secret type.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSecret {
    pub secret_type: SecretType,
    pub value: SecretString,
    /// Vault version for vault entries; `None` for break-glass and empty entries
    pub version: Option<String>,
    pub source: CacheSource,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedSecret {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whole seconds since the value was fetched or installed.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_seconds().max(0)
    }

    fn is_live_break_glass(&self, now: DateTime<Utc>) -> bool {
        self.source == CacheSource::BreakGlass && self.is_valid_at(now)
    }
}

/// How a lookup was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// A valid entry answered without contacting the vault
    Cached,
    /// This caller started the vault fetch
    Started,
    /// This caller awaited a fetch someone else started
    Joined,
}

/// Entry lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub empty_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
            empty_ttl: Duration::seconds(DEFAULT_EMPTY_TTL_SECS),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<CachedSecret>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

struct CacheInner {
    entries: DashMap<SecretType, CachedSecret>,
    in_flight: DashMap<SecretType, InFlight>,
    vault: Arc<dyn VaultClient>,
    clock: SharedClock,
    settings: CacheSettings,
    next_fetch_id: AtomicU64,
}

/// In-process secret cache. Cloning yields another handle to the same cache.
#[derive(Clone)]
pub struct SecretCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("entries", &self.inner.entries.len())
            .field("in_flight", &self.inner.in_flight.len())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl SecretCache {
    pub fn new(vault: Arc<dyn VaultClient>, clock: SharedClock, settings: CacheSettings) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                vault,
                clock,
                settings,
                next_fetch_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.inner.settings
    }

    /// The valid entry for `secret_type`, if any. Never performs I/O.
    pub fn get_cached(&self, secret_type: SecretType) -> Option<CachedSecret> {
        let now = self.inner.clock.now();
        self.inner.entries.get(&secret_type).filter(|entry| entry.is_valid_at(now)).map(|e| e.clone())
    }

    /// Return the cached value if valid, otherwise fetch it from the vault
    /// exactly once no matter how many callers are waiting.
    ///
    /// A valid `empty` sentinel short-circuits to `SecretUnavailable` without
    /// contacting the vault.
    pub async fn get_or_fetch(&self, metadata: &SecretMetadata) -> Result<CachedSecret> {
        self.get_or_fetch_with_origin(metadata).await.1
    }

    /// [`SecretCache::get_or_fetch`], also reporting how the result was
    /// obtained. Every waiter on a shared fetch sees the same outcome, but
    /// only one of them sees [`FetchOrigin::Started`].
    pub async fn get_or_fetch_with_origin(
        &self,
        metadata: &SecretMetadata,
    ) -> (FetchOrigin, Result<CachedSecret>) {
        let secret_type = metadata.secret_type;
        if let Some(entry) = self.get_cached(secret_type) {
            debug!(secret_type = %secret_type, source = %entry.source, "Cache hit for secret");
            return (FetchOrigin::Cached, usable(entry));
        }

        debug!(secret_type = %secret_type, "Cache miss, fetching from vault");
        self.await_fetch(metadata, false).await
    }

    /// Force a new vault fetch for `metadata.secret_type`.
    ///
    /// A live break-glass entry is returned untouched. If a fetch is already
    /// in flight the caller joins it. On failure any still-valid entry stays
    /// in place.
    pub async fn refresh(&self, metadata: &SecretMetadata) -> Result<CachedSecret> {
        self.refresh_with_origin(metadata).await.1
    }

    pub async fn refresh_with_origin(
        &self,
        metadata: &SecretMetadata,
    ) -> (FetchOrigin, Result<CachedSecret>) {
        let secret_type = metadata.secret_type;
        if let Some(entry) = self.get_cached(secret_type) {
            if entry.source == CacheSource::BreakGlass {
                debug!(secret_type = %secret_type, "Refresh skipped, break-glass override active");
                return (FetchOrigin::Cached, Ok(entry));
            }
        }

        self.await_fetch(metadata, true).await
    }

    /// Install a break-glass override, replacing whatever entry exists.
    pub fn set_break_glass(
        &self,
        secret_type: SecretType,
        plaintext: SecretString,
        ttl: Duration,
    ) -> CachedSecret {
        let now = self.inner.clock.now();
        let entry = CachedSecret {
            secret_type,
            value: plaintext,
            version: None,
            source: CacheSource::BreakGlass,
            fetched_at: now,
            expires_at: now + ttl,
        };
        self.inner.entries.insert(secret_type, entry.clone());
        warn!(secret_type = %secret_type, expires_at = %entry.expires_at, "Break-glass override installed in cache");
        entry
    }

    /// Remove the entry only if it is break-glass sourced. Returns whether an
    /// entry was removed. Vault entries are never evicted here.
    pub fn clear_break_glass(&self, secret_type: SecretType) -> bool {
        let removed = self
            .inner
            .entries
            .remove_if(&secret_type, |_, entry| entry.source == CacheSource::BreakGlass)
            .is_some();
        if removed {
            info!(secret_type = %secret_type, "Break-glass override cleared from cache");
        }
        removed
    }

    /// Install the `empty` sentinel so reads stop hitting the vault until the
    /// sentinel expires or a refresh succeeds. A live break-glass entry is kept.
    pub fn mark_empty(&self, secret_type: SecretType) -> CachedSecret {
        let now = self.inner.clock.now();
        let sentinel = CachedSecret {
            secret_type,
            value: SecretString::new(""),
            version: None,
            source: CacheSource::Empty,
            fetched_at: now,
            expires_at: now + self.inner.settings.empty_ttl,
        };

        match self.inner.entries.entry(secret_type) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live_break_glass(now) {
                    return occupied.get().clone();
                }
                occupied.insert(sentinel.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(sentinel.clone());
            }
        }
        debug!(secret_type = %secret_type, "Marked secret as empty");
        sentinel
    }

    async fn await_fetch(
        &self,
        metadata: &SecretMetadata,
        force: bool,
    ) -> (FetchOrigin, Result<CachedSecret>) {
        match self.join_or_start(metadata, force) {
            Ok((fetch, origin)) => (origin, fetch.await),
            Err(entry) => (FetchOrigin::Cached, usable(entry)),
        }
    }

    /// Join the in-flight fetch for this secret type or start a new one.
    ///
    /// Without `force`, a valid entry that appeared after the caller's first
    /// cache check is handed back as `Err(entry)` instead of starting a fetch.
    fn join_or_start(
        &self,
        metadata: &SecretMetadata,
        force: bool,
    ) -> std::result::Result<(SharedFetch, FetchOrigin), CachedSecret> {
        let secret_type = metadata.secret_type;
        match self.inner.in_flight.entry(secret_type) {
            Entry::Occupied(occupied) => {
                debug!(secret_type = %secret_type, "Joining in-flight vault fetch");
                Ok((occupied.get().fetch.clone(), FetchOrigin::Joined))
            }
            Entry::Vacant(vacant) => {
                // A finished fetch stores its entry before releasing its slot,
                // so this re-check cannot miss a result that just landed.
                if !force {
                    if let Some(entry) = self.get_cached(secret_type) {
                        return Err(entry);
                    }
                }

                let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let metadata = metadata.clone();
                let task = tokio::spawn(async move { inner.fetch_and_store(metadata, id).await });
                let fetch = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(SecretsError::internal(format!("vault fetch task failed: {}", e)))
                    })
                }
                .boxed()
                .shared();

                vacant.insert(InFlight { id, fetch: fetch.clone() });
                Ok((fetch, FetchOrigin::Started))
            }
        }
    }
}

impl CacheInner {
    async fn fetch_and_store(&self, metadata: SecretMetadata, id: u64) -> Result<CachedSecret> {
        let secret_type = metadata.secret_type;
        let outcome = match self
            .vault
            .access_secret_version(&metadata.vault_resource_id, &metadata.vault_version_alias)
            .await
        {
            Ok(secret) => {
                let now = self.clock.now();
                let entry = CachedSecret {
                    secret_type,
                    value: secret.value,
                    version: Some(secret.version),
                    source: CacheSource::Vault,
                    fetched_at: now,
                    expires_at: now + self.settings.ttl,
                };
                Ok(self.install_vault_entry(entry))
            }
            Err(e) => {
                warn!(secret_type = %secret_type, error = %e, "Vault fetch failed");
                Err(SecretsError::unavailable(secret_type, e.to_string()))
            }
        };

        self.in_flight.remove_if(&secret_type, |_, in_flight| in_flight.id == id);
        outcome
    }

    fn install_vault_entry(&self, entry: CachedSecret) -> CachedSecret {
        let now = self.clock.now();
        match self.entries.entry(entry.secret_type) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live_break_glass(now) {
                    debug!(
                        secret_type = %entry.secret_type,
                        "Vault value not installed, break-glass override takes precedence"
                    );
                    return occupied.get().clone();
                }
                occupied.insert(entry.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }
        debug!(
            secret_type = %entry.secret_type,
            version = ?entry.version,
            "Cached secret from vault"
        );
        entry
    }
}

fn usable(entry: CachedSecret) -> Result<CachedSecret> {
    if entry.source == CacheSource::Empty {
        return Err(SecretsError::unavailable(
            entry.secret_type,
            "marked unavailable after a failed vault fetch",
        ));
    }
    Ok(entry)
}
