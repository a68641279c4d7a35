//! Structured pack/unpack of payloads.
//!
//! The [`Packer`] turns a [`Payload`] into bytes and back. Structural encoding
//! is always JSON; when the configured [`SecretStatus`] is
//! [`Encrypted`](SecretStatus::Encrypted) the JSON text is additionally sealed
//! with AES-256-GCM and hex encoded:
//!
//! ```text
//! pack:   Payload ──json──▶ bytes ──aes-256-gcm──▶ nonce ‖ ciphertext ──hex──▶ bytes
//! unpack: bytes ──hex──▶ nonce ‖ ciphertext ──aes-256-gcm──▶ bytes ──json──▶ Payload
//! ```
//!
//! The cipher key is the SHA-256 digest of the configured secret. A fresh
//! random nonce is drawn for every pack, so packing the same payload twice
//! yields different bytes that unpack to the same payload.
//!
//! On the wire the packed string travels under the `data` key of a JSON
//! object in both directions; [`Packer::pack_wire`] and
//! [`Packer::unpack_wire`] add and remove that wrapper.

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::{CoreError, CoreResult};
use crate::message::{Payload, value_kind, wire_body, wire_packed};

/// Length of the AES-GCM nonce prefix in bytes.
const NONCE_LEN: usize = 12;

/// Whether the symmetric transform is applied on top of JSON encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStatus {
    /// JSON only.
    #[default]
    Plain,
    /// JSON sealed with AES-256-GCM.
    Encrypted,
}

impl From<bool> for SecretStatus {
    fn from(enabled: bool) -> Self {
        if enabled { Self::Encrypted } else { Self::Plain }
    }
}

/// Packer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Whether encryption is applied.
    #[serde(default)]
    pub secret_status: SecretStatus,
    /// Secret the cipher key is derived from. Required when encrypted.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl PackerConfig {
    /// A configuration that only applies JSON encoding.
    pub fn plain() -> Self {
        Self::default()
    }

    /// A configuration that encrypts with a key derived from `secret`.
    pub fn encrypted(secret: impl Into<String>) -> Self {
        Self {
            secret_status: SecretStatus::Encrypted,
            secret_key: Some(secret.into()),
        }
    }
}

/// Packs and unpacks payloads under a fixed configuration.
///
/// `Packer` is cheap to clone and read-only after construction, so one
/// instance can be shared by every concurrent request.
#[derive(Clone)]
pub struct Packer {
    status: SecretStatus,
    cipher: Option<Aes256Gcm>,
}

impl Packer {
    /// Creates a packer from its configuration.
    ///
    /// Fails with [`CoreError::InvalidConfig`] when encryption is enabled
    /// without a non-empty secret.
    pub fn new(config: &PackerConfig) -> CoreResult<Self> {
        let cipher = match config.secret_status {
            SecretStatus::Plain => None,
            SecretStatus::Encrypted => {
                let secret = config
                    .secret_key
                    .as_deref()
                    .filter(|secret| !secret.is_empty())
                    .ok_or_else(|| {
                        CoreError::InvalidConfig(
                            "secret_key is required when secret_status is 'encrypted'".into(),
                        )
                    })?;
                let key = Sha256::digest(secret.as_bytes());
                let cipher = Aes256Gcm::new_from_slice(&key)
                    .map_err(|e| CoreError::InvalidConfig(format!("invalid cipher key: {e}")))?;
                Some(cipher)
            }
        };

        Ok(Self {
            status: config.secret_status,
            cipher,
        })
    }

    /// A packer that only applies JSON encoding.
    pub fn plain() -> Self {
        Self {
            status: SecretStatus::Plain,
            cipher: None,
        }
    }

    /// Returns the active secret status.
    pub fn secret_status(&self) -> SecretStatus {
        self.status
    }

    /// Packs a payload into bytes.
    pub fn pack(&self, data: &Payload) -> CoreResult<Vec<u8>> {
        let json = serde_json::to_vec(data)?;
        self.seal(json)
    }

    /// Packs any serializable value whose JSON form is a mapping.
    pub fn pack_value<T: Serialize + ?Sized>(&self, value: &T) -> CoreResult<Vec<u8>> {
        match serde_json::to_value(value)? {
            Value::Object(map) => self.pack(&map),
            other => Err(CoreError::Serialization(format!(
                "packed value must be a mapping, got {}",
                value_kind(&other)
            ))),
        }
    }

    /// Packs a payload and wraps it as a `{"data": "<packed>"}` wire body.
    pub fn pack_wire(&self, data: &Payload) -> CoreResult<Vec<u8>> {
        let packed = self.pack(data)?;
        Ok(wire_body(Some(packed.as_slice())))
    }

    /// Unpacks a `{"data": "<packed>"}` wire body.
    ///
    /// Both the outer body and the packed payload must decode, otherwise the
    /// result is [`CoreError::MalformedPayload`].
    pub fn unpack_wire(&self, body: &[u8]) -> CoreResult<Payload> {
        let packed = wire_packed(body)?;
        self.unpack(packed.as_bytes())
    }

    /// Unpacks bytes into a payload.
    ///
    /// Any structural failure yields [`CoreError::MalformedPayload`]; partial
    /// data is never returned.
    pub fn unpack(&self, bytes: &[u8]) -> CoreResult<Payload> {
        let json = self.open(bytes)?;

        match serde_json::from_slice::<Value>(&json).map_err(CoreError::malformed)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::malformed(format!(
                "expected a mapping at the top level, got {}",
                value_kind(&other)
            ))),
        }
    }

    fn seal(&self, plaintext: Vec<u8>) -> CoreResult<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext);
        };

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CoreError::Serialization("encryption failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        trace!(bytes = sealed.len(), "Sealed payload");

        Ok(hex::encode(sealed).into_bytes())
    }

    fn open(&self, bytes: &[u8]) -> CoreResult<Vec<u8>> {
        let Some(cipher) = &self.cipher else {
            return Ok(bytes.to_vec());
        };

        let text = std::str::from_utf8(bytes).map_err(CoreError::malformed)?;
        let sealed = hex::decode(text.trim()).map_err(CoreError::malformed)?;
        if sealed.len() <= NONCE_LEN {
            return Err(CoreError::malformed(format!(
                "encrypted payload too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::malformed("decryption failed"))
    }
}

impl std::fmt::Debug for Packer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packer")
            .field("secret_status", &self.status)
            .finish_non_exhaustive()
    }
}
