//! # Configuration Settings
//!
//! Defines the configuration structure for the secretops service. Every value
//! comes from `SECRETOPS_*` environment variables with the defaults below.

use crate::errors::{Error, Result};
use crate::secrets::{
    ActorType, CacheSettings, EnvelopeCipher, SecretString, VaultConfig,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP API configuration
    #[validate(nested)]
    pub api: ApiConfig,

    /// Secret lifecycle tuning
    #[validate(nested)]
    pub secrets: SecretsSettings,

    /// Vault connection; `None` when no address is configured
    pub vault: Option<VaultConfig>,

    /// Break-glass envelope key
    #[validate(nested)]
    pub break_glass: BreakGlassConfig,

    /// Static API credentials
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };

        let api = ApiConfig {
            host: env.string("SECRETOPS_API_HOST", ApiConfig::default().host),
            port: env.parse("SECRETOPS_API_PORT", ApiConfig::default().port)?,
        };

        let defaults = SecretsSettings::default();
        let secrets = SecretsSettings {
            environment: env.string("SECRETOPS_ENVIRONMENT", defaults.environment),
            vault_resource_prefix: env
                .string("SECRETOPS_VAULT_RESOURCE_PREFIX", defaults.vault_resource_prefix),
            cache_ttl_seconds: env.parse("SECRETOPS_CACHE_TTL_SECONDS", defaults.cache_ttl_seconds)?,
            empty_ttl_seconds: env.parse("SECRETOPS_EMPTY_TTL_SECONDS", defaults.empty_ttl_seconds)?,
            alert_threshold: env.parse("SECRETOPS_ALERT_THRESHOLD", defaults.alert_threshold)?,
            monitor_interval_seconds: env
                .parse("SECRETOPS_MONITOR_INTERVAL_SECONDS", defaults.monitor_interval_seconds)?,
            rotation_interval_days: env
                .parse("SECRETOPS_ROTATION_INTERVAL_DAYS", defaults.rotation_interval_days)?,
        };

        let vault = match env.get("SECRETOPS_VAULT_ADDR").or_else(|| env.get("VAULT_ADDR")) {
            Some(address) => Some(VaultConfig {
                address,
                token: env
                    .get("SECRETOPS_VAULT_TOKEN")
                    .or_else(|| env.get("VAULT_TOKEN"))
                    .map(SecretString::new),
                namespace: env
                    .get("SECRETOPS_VAULT_NAMESPACE")
                    .or_else(|| env.get("VAULT_NAMESPACE")),
                kv_mount_path: env.string("SECRETOPS_VAULT_KV_MOUNT", "secret".to_string()),
                timeout_ms: env.parse("SECRETOPS_VAULT_TIMEOUT_MS", 5_000)?,
            }),
            None => None,
        };

        let break_glass = BreakGlassConfig {
            key_base64: env.get("SECRETOPS_BREAK_GLASS_KEY").map(SecretString::new),
            key_id: env.string("SECRETOPS_BREAK_GLASS_KEY_ID", BreakGlassConfig::default().key_id),
        };

        let auth = match env.get("SECRETOPS_API_TOKENS") {
            Some(raw) => AuthConfig { tokens: parse_token_grants(&raw)? },
            None => AuthConfig::default(),
        };

        let defaults = ObservabilityConfig::default();
        let observability = ObservabilityConfig {
            enable_metrics: env.flag("SECRETOPS_ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: env.parse("SECRETOPS_METRICS_PORT", defaults.metrics_port)?,
            service_name: env.string("SECRETOPS_SERVICE_NAME", defaults.service_name),
            log_level: env
                .get("RUST_LOG")
                .or_else(|| env.get("SECRETOPS_LOG_LEVEL"))
                .unwrap_or(defaults.log_level),
            json_logging: env.flag("SECRETOPS_LOG_JSON", defaults.json_logging),
        };

        Ok(Self { api, secrets, vault, break_glass, auth, observability })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.observability.enable_metrics && self.api.port == self.observability.metrics_port {
            return Err(Error::config("API and metrics ports cannot be the same"));
        }

        if self.secrets.empty_ttl_seconds > self.secrets.cache_ttl_seconds {
            return Err(Error::config("Empty-sentinel TTL cannot exceed the cache TTL"));
        }

        // Surfaces a malformed key at startup rather than on first use
        self.break_glass.cipher()?;

        Ok(())
    }
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    fn string(&self, name: &str, default: String) -> String {
        self.get(name).unwrap_or(default)
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        self.get(name).map(|s| s.to_lowercase() == "true" || s == "1").unwrap_or(default)
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::config(format!("Invalid {} '{}': {}", name, raw, e))),
            None => Ok(default),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    /// Bind host
    #[validate(length(min = 1, message = "API host cannot be empty"))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1, message = "API port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Secret lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecretsSettings {
    /// Deployment environment recorded on metadata
    #[validate(length(min = 1, message = "Environment cannot be empty"))]
    pub environment: String,

    /// Prefix joined with the secret type to form the vault resource id
    pub vault_resource_prefix: String,

    #[validate(range(min = 1, max = 86400, message = "Cache TTL must be between 1 and 86400 seconds"))]
    pub cache_ttl_seconds: u64,

    #[validate(range(min = 1, max = 3600, message = "Empty TTL must be between 1 and 3600 seconds"))]
    pub empty_ttl_seconds: u64,

    /// Consecutive failures before an escalation is raised
    #[validate(range(min = 1, max = 100, message = "Alert threshold must be between 1 and 100"))]
    pub alert_threshold: u32,

    #[validate(range(
        min = 1,
        max = 86400,
        message = "Monitor interval must be between 1 and 86400 seconds"
    ))]
    pub monitor_interval_seconds: u64,

    /// Rotation deadline assigned to freshly seeded metadata
    #[validate(range(min = 1, max = 3650, message = "Rotation interval must be between 1 and 3650 days"))]
    pub rotation_interval_days: i64,
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            vault_resource_prefix: "trading/".to_string(),
            cache_ttl_seconds: 300,
            empty_ttl_seconds: 30,
            alert_threshold: 3,
            monitor_interval_seconds: 900,
            rotation_interval_days: 90,
        }
    }
}

impl SecretsSettings {
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: chrono::Duration::seconds(self.cache_ttl_seconds as i64),
            empty_ttl: chrono::Duration::seconds(self.empty_ttl_seconds as i64),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn rotation_interval(&self) -> chrono::Duration {
        chrono::Duration::days(self.rotation_interval_days)
    }
}

/// Break-glass envelope key configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BreakGlassConfig {
    /// Base64-encoded 32-byte AES-256 key; break-glass is disabled without it
    pub key_base64: Option<SecretString>,

    #[validate(length(min = 1, message = "Break-glass key id cannot be empty"))]
    pub key_id: String,
}

impl Default for BreakGlassConfig {
    fn default() -> Self {
        Self { key_base64: None, key_id: "default".to_string() }
    }
}

impl BreakGlassConfig {
    /// The envelope cipher, or `None` when no key is configured.
    pub fn cipher(&self) -> Result<Option<EnvelopeCipher>> {
        self.key_base64
            .as_ref()
            .map(|key| EnvelopeCipher::from_base64_key(key.expose_secret(), self.key_id.clone()))
            .transpose()
            .map_err(Error::from)
    }
}

/// A static bearer token and the identity it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: SecretString,
    pub actor_type: ActorType,
    pub actor_id: String,
    pub scopes: Vec<String>,
}

/// Static API credentials
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenGrant>,
}

/// Parse `SECRETOPS_API_TOKENS`.
///
/// Entries are separated by `;`, each `token|actor_type|actor_id|scope,scope`.
pub fn parse_token_grants(raw: &str) -> Result<Vec<TokenGrant>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(index, entry)| {
            let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
            let [token, actor_type, actor_id, scopes] = parts.as_slice() else {
                return Err(Error::config(format!(
                    "API token entry {} must have the form token|actor_type|actor_id|scopes",
                    index + 1
                )));
            };

            if token.is_empty() || actor_id.is_empty() {
                return Err(Error::config(format!(
                    "API token entry {} has an empty token or actor id",
                    index + 1
                )));
            }

            let actor_type = actor_type.parse::<ActorType>().map_err(Error::config)?;
            let scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(String::from)
                .collect();

            Ok(TokenGrant {
                token: SecretString::new(*token),
                actor_type,
                actor_id: actor_id.to_string(),
                scopes,
            })
        })
        .collect()
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or an EnvFilter string)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "secretops".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
