//! Break-glass payload envelope (AES-256-GCM).
//!
//! Operators never send a break-glass value in the clear. The `ciphertext`
//! field of a break-glass request is standard base64 of a JSON document:
//!
//! ```json
//! { "keyId": "ops-2024", "nonce": "<base64 12 bytes>", "data": "<base64 ciphertext||tag>" }
//! ```
//!
//! sealed under the configured break-glass key. Every way an envelope can be
//! wrong (encoding, shape, key id, authentication, UTF-8) is reported as
//! [`SecretsError::InvalidBreakGlassPayload`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use super::error::{Result, SecretsError};
use super::types::SecretString;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeDocument {
    key_id: String,
    nonce: String,
    data: String,
}

struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Opens (and, for operator tooling, seals) break-glass envelopes.
#[derive(Clone)]
pub struct EnvelopeCipher {
    key_bytes: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    key_id: String,
    rng: Arc<SystemRandom>,
}

impl std::fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCipher")
            .field("key_id", &self.key_id)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}

impl EnvelopeCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_base64: &str, key_id: impl Into<String>) -> Result<Self> {
        let decoded = Zeroizing::new(STANDARD.decode(key_base64.trim()).map_err(|e| {
            SecretsError::config(format!("Invalid base64 in break-glass key: {}", e))
        })?);

        if decoded.len() != KEY_SIZE {
            return Err(SecretsError::config(format!(
                "Break-glass key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                decoded.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(&decoded);
        Ok(Self::from_key_bytes(key, key_id))
    }

    fn from_key_bytes(key: Zeroizing<[u8; KEY_SIZE]>, key_id: impl Into<String>) -> Self {
        let key_id = key_id.into();
        debug!(key_id = %key_id, "Break-glass envelope cipher initialized");
        Self { key_bytes: Arc::new(key), key_id, rng: Arc::new(SystemRandom::new()) }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Decrypt an envelope to its plaintext value.
    #[instrument(skip(self, envelope), fields(envelope_len = envelope.len()))]
    pub fn open(&self, envelope: &str) -> Result<SecretString> {
        let raw = STANDARD
            .decode(envelope.trim())
            .map_err(|e| SecretsError::invalid_payload(format!("envelope is not base64: {}", e)))?;

        let document: EnvelopeDocument = serde_json::from_slice(&raw).map_err(|e| {
            SecretsError::invalid_payload(format!("envelope is not a valid document: {}", e))
        })?;

        if document.key_id != self.key_id {
            warn!(
                expected = %self.key_id,
                received = %document.key_id,
                "Break-glass envelope sealed under unknown key"
            );
            return Err(SecretsError::invalid_payload(format!(
                "envelope key id '{}' is not recognized",
                document.key_id
            )));
        }

        let nonce = STANDARD
            .decode(&document.nonce)
            .map_err(|e| SecretsError::invalid_payload(format!("nonce is not base64: {}", e)))?;
        let nonce: [u8; NONCE_SIZE] = nonce.as_slice().try_into().map_err(|_| {
            SecretsError::invalid_payload(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                nonce.len()
            ))
        })?;

        let mut buffer = STANDARD
            .decode(&document.data)
            .map_err(|e| SecretsError::invalid_payload(format!("data is not base64: {}", e)))?;
        if buffer.len() < TAG_SIZE {
            return Err(SecretsError::invalid_payload("data is shorter than the authentication tag"));
        }

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..])
            .map_err(|_| SecretsError::internal("Failed to create break-glass decryption key"))?;
        let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce { nonce: Some(nonce) });

        let plaintext = opening_key
            .open_in_place(Aad::empty(), &mut buffer)
            .map_err(|_| SecretsError::invalid_payload("authentication failed"))?;

        let value = std::str::from_utf8(plaintext)
            .map_err(|_| SecretsError::invalid_payload("plaintext is not valid UTF-8"))?
            .to_string();

        Ok(SecretString::new(value))
    }

    /// Seal `plaintext` into an envelope this cipher can open.
    #[instrument(skip(self, plaintext))]
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| SecretsError::internal("Failed to generate random nonce"))?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, &self.key_bytes[..])
            .map_err(|_| SecretsError::internal("Failed to create break-glass encryption key"))?;
        let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce { nonce: Some(nonce) });

        let mut buffer = plaintext.as_bytes().to_vec();
        buffer.reserve(TAG_SIZE);
        sealing_key
            .seal_in_place_append_tag(Aad::empty(), &mut buffer)
            .map_err(|_| SecretsError::internal("Failed to seal break-glass envelope"))?;

        let document = EnvelopeDocument {
            key_id: self.key_id.clone(),
            nonce: STANDARD.encode(nonce),
            data: STANDARD.encode(&buffer),
        };
        let json = serde_json::to_vec(&document)
            .map_err(|e| SecretsError::internal(format!("Failed to encode envelope: {}", e)))?;

        Ok(STANDARD.encode(json))
    }

    /// A cipher with a fixed all-0x42 key. Test use only.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self::from_key_bytes(Zeroizing::new([0x42u8; KEY_SIZE]), "test")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let cipher = EnvelopeCipher::for_testing();
        let envelope = cipher.seal("emergency-api-key").unwrap();
        assert!(!envelope.contains("emergency-api-key"));

        let opened = cipher.open(&envelope).unwrap();
        assert_eq!(opened.expose_secret(), "emergency-api-key");
    }

    #[test]
    fn test_rejects_non_base64() {
        let err = EnvelopeCipher::for_testing().open("not base64 at all!").unwrap_err();
        assert!(matches!(err, SecretsError::InvalidBreakGlassPayload { .. }));
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let envelope = STANDARD.encode(br#"{"hello":"world"}"#);
        let err = EnvelopeCipher::for_testing().open(&envelope).unwrap_err();
        assert!(matches!(err, SecretsError::InvalidBreakGlassPayload { .. }));
    }

    #[test]
    fn test_rejects_unknown_key_id() {
        let other = EnvelopeCipher::from_base64_key(&STANDARD.encode([0x42u8; 32]), "other").unwrap();
        let envelope = other.seal("value").unwrap();

        let err = EnvelopeCipher::for_testing().open(&envelope).unwrap_err();
        assert!(err.to_string().contains("key id 'other'"));
    }

    #[test]
    fn test_rejects_tampered_data() {
        let cipher = EnvelopeCipher::for_testing();
        let raw = STANDARD.decode(cipher.seal("value").unwrap()).unwrap();
        let mut document: EnvelopeDocument = serde_json::from_slice(&raw).unwrap();

        let mut data = STANDARD.decode(&document.data).unwrap();
        data[0] ^= 0xFF;
        document.data = STANDARD.encode(data);
        let tampered = STANDARD.encode(serde_json::to_vec(&document).unwrap());

        let err = cipher.open(&tampered).unwrap_err();
        assert_eq!(err, SecretsError::invalid_payload("authentication failed"));
    }

    #[test]
    fn test_rejects_wrong_key_same_id() {
        let sealer = EnvelopeCipher::from_base64_key(&STANDARD.encode([0x07u8; 32]), "test").unwrap();
        let envelope = sealer.seal("value").unwrap();
        assert!(EnvelopeCipher::for_testing().open(&envelope).is_err());
    }

    #[test]
    fn test_key_must_be_32_bytes() {
        let err = EnvelopeCipher::from_base64_key(&STANDARD.encode([0u8; 16]), "short").unwrap_err();
        assert!(matches!(err, SecretsError::Config { .. }));
        assert!(EnvelopeCipher::from_base64_key("%%%", "bad").is_err());
    }
}
