//! Vault boundary.
//!
//! [`VaultClient`] is the only way the lifecycle core reaches the external
//! secret vault. Every failure behind it is reported as a transient
//! [`SecretsError::Vault`]; retry policy belongs to callers.
//!
//! [`KvVaultClient`] is the production adapter for HashiCorp Vault's KV v2
//! engine, built on `vaultrs`.
//!
//! ## Secret Format in Vault
//!
//! ```json
//! { "value": "<plaintext>" }
//! ```
//!
//! A `secret` field is accepted in place of `value`.
//!
//! ## Version Aliases
//!
//! - `latest` (or empty) reads the current version
//! - `7` or `v7` reads version 7
//!
//! Connection settings are loaded by [`crate::config::AppConfig`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use vaultrs::client::{VaultClient as KvHttpClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use super::error::{Result, SecretsError};
use super::types::SecretString;

/// A secret version as returned by the vault.
#[derive(Debug, Clone)]
pub struct VaultSecret {
    pub value: SecretString,
    pub version: String,
    /// Round-trip time of the vault call
    pub duration_ms: u64,
}

/// Read access to the external secret vault.
#[async_trait]
pub trait VaultClient: Send + Sync + std::fmt::Debug {
    /// Fetch the plaintext and version identifier of `resource_id` at `version_alias`.
    async fn access_secret_version(
        &self,
        resource_id: &str,
        version_alias: &str,
    ) -> Result<VaultSecret>;
}

/// Parsed form of a version alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionAlias {
    Latest,
    Pinned(u64),
}

impl VersionAlias {
    pub fn parse(alias: &str) -> Result<Self> {
        let trimmed = alias.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }

        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        digits
            .parse::<u64>()
            .map(Self::Pinned)
            .map_err(|_| SecretsError::vault(format!("Invalid vault version alias '{}'", alias)))
    }
}

fn default_kv_mount() -> String {
    "secret".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Configuration for the KV v2 adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault server address
    pub address: String,
    /// Vault authentication token
    pub token: Option<SecretString>,
    /// Vault namespace (for Enterprise)
    pub namespace: Option<String>,
    /// KV v2 mount path (default: "secret")
    #[serde(default = "default_kv_mount")]
    pub kv_mount_path: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl VaultConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// HashiCorp Vault KV v2 adapter.
pub struct KvVaultClient {
    client: KvHttpClient,
    kv_mount_path: String,
    timeout: Duration,
}

impl std::fmt::Debug for KvVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvVaultClient")
            .field("kv_mount_path", &self.kv_mount_path)
            .field("timeout", &self.timeout)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl KvVaultClient {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token.expose_secret());
        }

        if let Some(ref namespace) = config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder
            .build()
            .map_err(|e| SecretsError::config(format!("Invalid Vault configuration: {}", e)))?;

        let client = KvHttpClient::new(settings)
            .map_err(|e| SecretsError::config(format!("Failed to create Vault client: {}", e)))?;

        info!(
            address = %config.address,
            kv_mount = %config.kv_mount_path,
            timeout_ms = config.timeout_ms,
            "Initialized Vault KV v2 client"
        );

        Ok(Self { client, kv_mount_path: config.kv_mount_path.clone(), timeout: config.timeout() })
    }

    async fn read(&self, resource_id: &str, alias: VersionAlias) -> Result<(String, String)> {
        // Resolve `latest` to a concrete version first so the value and the
        // reported version always come from the same write.
        let version = match alias {
            VersionAlias::Pinned(version) => version,
            VersionAlias::Latest => {
                kv2::read_metadata(&self.client, &self.kv_mount_path, resource_id)
                    .await
                    .map_err(|e| {
                        SecretsError::vault(format!("metadata read of '{}' failed: {}", resource_id, e))
                    })?
                    .current_version
            }
        };

        let data: HashMap<String, serde_json::Value> =
            kv2::read_version(&self.client, &self.kv_mount_path, resource_id, version)
                .await
                .map_err(|e| SecretsError::vault(format!("read of '{}' failed: {}", resource_id, e)))?;

        let value = extract_value(&data).ok_or_else(|| {
            SecretsError::vault(format!(
                "Secret '{}' must have a string 'value' or 'secret' field",
                resource_id
            ))
        })?;

        Ok((value, version.to_string()))
    }
}

fn extract_value(data: &HashMap<String, serde_json::Value>) -> Option<String> {
    data.get("value")
        .or_else(|| data.get("secret"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[async_trait]
impl VaultClient for KvVaultClient {
    async fn access_secret_version(
        &self,
        resource_id: &str,
        version_alias: &str,
    ) -> Result<VaultSecret> {
        let alias = VersionAlias::parse(version_alias)?;
        debug!(
            resource_id = %resource_id,
            version_alias = %version_alias,
            kv_mount = %self.kv_mount_path,
            "Fetching secret version from Vault"
        );

        let started = Instant::now();
        let (value, version) = tokio::time::timeout(self.timeout, self.read(resource_id, alias))
            .await
            .map_err(|_| {
                SecretsError::vault(format!(
                    "read of '{}' timed out after {}ms",
                    resource_id,
                    self.timeout.as_millis()
                ))
            })?
            .inspect_err(|e| {
                error!(resource_id = %resource_id, error = %e, "Vault fetch failed");
            })?;

        Ok(VaultSecret {
            value: SecretString::new(value),
            version,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
