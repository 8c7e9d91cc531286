//! Common test utilities for all integration tests.
//!
//! Provides a scripted vault client and a harness that wires the full
//! lifecycle against a manual clock.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Duration;
use secretops::api::{build_router, TokenAuthenticator};
use secretops::config::parse_token_grants;
use secretops::observability::MetricsRecorder;
use secretops::secrets::{
    seed_catalog, CacheSettings, Clock, EnvelopeCipher, InMemoryMetadataStore, LifecycleSettings,
    ManualClock, SecretLifecycle, SecretString, SecretsError, SharedClock, VaultClient, VaultSecret,
};
use tokio::sync::Semaphore;

/// 32 bytes of 0x42, base64 encoded.
pub const TEST_KEY_BASE64: &str = "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=";
pub const TEST_KEY_ID: &str = "test-key";

pub const OPERATOR_TOKEN: &str = "operator-token";
pub const SERVICE_TOKEN: &str = "service-token";
pub const READER_TOKEN: &str = "reader-token";

/// Vault double with call counting, scripted failures and an optional gate
/// that holds every call until permits are released.
#[derive(Debug)]
pub struct MockVaultClient {
    calls: AtomicUsize,
    latest_version: AtomicU64,
    failing: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl Default for MockVaultClient {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            latest_version: AtomicU64::new(1),
            failing: AtomicBool::new(false),
            gate: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockVaultClient {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_latest_version(&self, version: u64) {
        self.latest_version.store(version, Ordering::SeqCst);
    }

    /// Hold every subsequent call until permits are added to the returned semaphore.
    pub fn gate(&self) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(semaphore.clone());
        semaphore
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    /// Yield until at least `count` calls have started.
    pub async fn wait_for_calls(&self, count: usize) {
        while self.calls() < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl VaultClient for MockVaultClient {
    async fn access_secret_version(
        &self,
        resource_id: &str,
        version_alias: &str,
    ) -> Result<VaultSecret, SecretsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push((resource_id.to_string(), version_alias.to_string()));

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.map_err(|_| SecretsError::vault("gate closed"))?;
            permit.forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SecretsError::vault("scripted vault outage"));
        }

        let version = match version_alias.parse::<u64>() {
            Ok(pinned) => pinned,
            Err(_) => self.latest_version.load(Ordering::SeqCst),
        };
        Ok(VaultSecret {
            value: SecretString::new(format!("{}@{}", resource_id, version)),
            version: version.to_string(),
            duration_ms: 1,
        })
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub vault: Arc<MockVaultClient>,
    pub store: Arc<InMemoryMetadataStore>,
    pub lifecycle: SecretLifecycle,
    pub cipher: EnvelopeCipher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(LifecycleSettings::default())
    }

    pub fn with_cache_ttl(ttl: Duration) -> Self {
        Self::with_settings(LifecycleSettings {
            cache: CacheSettings { ttl, ..CacheSettings::default() },
            ..LifecycleSettings::default()
        })
    }

    pub fn with_settings(settings: LifecycleSettings) -> Self {
        let clock = ManualClock::starting_now();
        let shared: SharedClock = Arc::new(clock.clone());
        let vault = Arc::new(MockVaultClient::default());
        let store = Arc::new(InMemoryMetadataStore::new(
            seed_catalog("test", "trading/", Duration::days(90), clock.now()),
            shared.clone(),
        ));
        let cipher = test_cipher();
        let lifecycle = SecretLifecycle::new(
            vault.clone(),
            store.clone(),
            Some(cipher.clone()),
            settings,
            shared,
            MetricsRecorder::new(),
        );

        Self { clock, vault, store, lifecycle, cipher }
    }

    pub fn seal(&self, plaintext: &str) -> String {
        self.cipher.seal(plaintext).unwrap()
    }

    pub fn router(&self) -> Router {
        let grants = parse_token_grants(&format!(
            "{OPERATOR_TOKEN}|operator|alice|secrets:status:read,secrets:break-glass,secrets:rotate;\
             {SERVICE_TOKEN}|service|pricer|secrets:cache-admin;\
             {READER_TOKEN}|operator|bob|secrets:status:read"
        ))
        .unwrap();
        build_router(self.lifecycle.clone(), TokenAuthenticator::new(&grants, MetricsRecorder::new()))
    }
}

pub fn test_cipher() -> EnvelopeCipher {
    EnvelopeCipher::from_base64_key(TEST_KEY_BASE64, TEST_KEY_ID).unwrap()
}
