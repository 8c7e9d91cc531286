//! Core value types for the secret lifecycle.
//!
//! The catalog of secret types is closed: adding a credential category is a
//! code change, never configuration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Known credential categories used by the trading backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretType {
    /// Exchange API key
    TradingApiKey,
    /// Exchange OAuth client secret
    TradingClientSecret,
    /// HMAC secret shared with inbound webhook senders
    WebhookSharedSecret,
    /// Seed for request signing keys
    SigningSeed,
}

impl SecretType {
    /// Every known secret type, in catalog order.
    pub const ALL: [SecretType; 4] = [
        SecretType::TradingApiKey,
        SecretType::TradingClientSecret,
        SecretType::WebhookSharedSecret,
        SecretType::SigningSeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TradingApiKey => "trading-api-key",
            Self::TradingClientSecret => "trading-client-secret",
            Self::WebhookSharedSecret => "webhook-shared-secret",
            Self::SigningSeed => "signing-seed",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SecretType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown secret type: {}", s))
    }
}

/// Where the currently usable value of a secret came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    Vault,
    BreakGlass,
    /// Known failure state; the cached value is empty
    Empty,
}

impl CacheSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::BreakGlass => "break_glass",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a secret type's metadata record.
///
/// `Active -> Rotating -> Active` is the rotation cycle; any status may move
/// to `Deprecated`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    Active,
    Rotating,
    Deprecated,
}

impl RotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotating => "rotating",
            Self::Deprecated => "deprecated",
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle transition.
    ///
    /// Re-asserting the current status is allowed for every non-terminal status.
    pub fn can_transition_to(&self, next: RotationStatus) -> bool {
        use RotationStatus::*;
        match (self, next) {
            (Deprecated, _) => false,
            (_, Deprecated) => true,
            (Active, Rotating) | (Rotating, Active) => true,
            (current, next) => *current == next,
        }
    }
}

impl fmt::Display for RotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Operator,
    Service,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Service => "service",
            Self::System => "system",
        }
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "operator" => Ok(Self::Operator),
            "service" => Ok(Self::Service),
            "system" => Ok(Self::System),
            other => Err(format!("Unknown actor type: {}", other)),
        }
    }
}

/// An already-authenticated caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: String,
}

impl Actor {
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self { actor_type, actor_id: actor_id.into() }
    }

    pub fn operator(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::Operator, actor_id)
    }

    pub fn service(actor_id: impl Into<String>) -> Self {
        Self::new(ActorType::Service, actor_id)
    }

    /// The process itself (monitor sweeps, bootstrap).
    pub fn system() -> Self {
        Self::new(ActorType::System, "secretops")
    }
}

/// A string wrapper that redacts its contents in Debug, Display, and serialization.
///
/// - Debug output shows `SecretString([REDACTED])`
/// - Display output shows `[REDACTED]`
/// - Serialization outputs `"[REDACTED]"`
/// - Memory is zeroed when dropped
///
/// The plaintext is only reachable through [`SecretString::expose_secret`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(SecretString(value))
    }
}

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Exposes the underlying secret value. Never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_type_roundtrip() {
        for t in SecretType::ALL {
            let parsed: SecretType = t.as_str().parse().unwrap();
            assert_eq!(parsed, t);

            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
        }
        assert!("database-password".parse::<SecretType>().is_err());
    }

    #[test]
    fn test_cache_source_serialization() {
        assert_eq!(serde_json::to_string(&CacheSource::BreakGlass).unwrap(), "\"break_glass\"");
        assert_eq!(CacheSource::Empty.to_string(), "empty");
    }

    #[test]
    fn test_status_transitions() {
        use RotationStatus::*;
        assert!(Active.can_transition_to(Rotating));
        assert!(Rotating.can_transition_to(Active));
        assert!(Active.can_transition_to(Deprecated));
        assert!(Rotating.can_transition_to(Deprecated));
        assert!(Active.can_transition_to(Active));

        assert!(!Deprecated.can_transition_to(Active));
        assert!(!Deprecated.can_transition_to(Rotating));
        assert!(!Deprecated.can_transition_to(Deprecated));
    }

    #[test]
    fn test_secret_string_redacts() {
        let secret = SecretString::new("super-secret-value");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"[REDACTED]\"");
        assert_eq!(secret.expose_secret(), "super-secret-value");
    }

    #[test]
    fn test_secret_string_in_struct_json() {
        #[derive(Serialize)]
        struct Wrapper {
            name: String,
            value: SecretString,
        }

        let json = serde_json::to_string(&Wrapper {
            name: "visible".to_string(),
            value: SecretString::new("hidden-password"),
        })
        .unwrap();

        assert!(json.contains("visible"));
        assert!(!json.contains("hidden-password"));
    }
}
