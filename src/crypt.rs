//! Encrypted-at-rest configuration values.
//!
//! Secrets in the config file (`apiKey`, `jwtSecret`, `certPassword`) may be
//! stored either as plaintext or in the form produced by `--crypt`:
//!
//! ```text
//! crypt:v1:<base64(nonce || ciphertext)>
//! ```
//!
//! The cipher is AES-256-GCM with a random 96-bit nonce. The key is read from
//! `APP_CRYPT_KEY` (base64, 32 bytes) when set, otherwise the built-in
//! application key is used.
//!
//! Values are decrypted once while the config is deserialized. The plaintext
//! is only reachable through [`EncryptedString::value`] and never printed by
//! `Debug`.

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Deserializer};

use crate::error::{AppError, AppResult};

/// Prefix marking an encrypted value.
pub const CIPHERTEXT_PREFIX: &str = "crypt:v1:";

/// Environment variable holding a base64 encoded 32 byte key.
pub const CRYPT_KEY_ENV: &str = "APP_CRYPT_KEY";

const DEFAULT_KEY: &[u8; 32] = b"api-skeleton-default-crypt-key!!";

const NONCE_LEN: usize = 12;

/// A secret config value, decrypted on load.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptedString {
    plain: String,
}

impl EncryptedString {
    /// Wrap a plaintext value.
    pub fn new(plain: impl Into<String>) -> Self {
        Self {
            plain: plain.into(),
        }
    }

    /// Build from the stored config representation.
    ///
    /// Values carrying [`CIPHERTEXT_PREFIX`] are decrypted with the active key;
    /// anything else is taken verbatim.
    pub fn from_stored(stored: &str) -> AppResult<Self> {
        match stored.strip_prefix(CIPHERTEXT_PREFIX) {
            Some(encoded) => {
                let key = active_key()?;
                let plain = decrypt_with(&key, encoded)?;
                Ok(Self { plain })
            }
            None => Ok(Self::new(stored)),
        }
    }

    /// The decrypted value.
    pub fn value(&self) -> &str {
        &self.plain
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }

    /// Encrypt the value with the active key for storage in a config file.
    pub fn encrypted_value(&self) -> AppResult<String> {
        let key = active_key()?;
        encrypt_with(&key, &self.plain)
    }
}

impl fmt::Debug for EncryptedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.plain.is_empty() {
            f.write_str("EncryptedString(<empty>)")
        } else {
            f.write_str("EncryptedString(***)")
        }
    }
}

impl<'de> Deserialize<'de> for EncryptedString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let stored = String::deserialize(deserializer)?;
        EncryptedString::from_stored(&stored).map_err(serde::de::Error::custom)
    }
}

/// Resolve the encryption key from the environment or the built-in default.
fn active_key() -> AppResult<[u8; 32]> {
    let Ok(encoded) = std::env::var(CRYPT_KEY_ENV) else {
        return Ok(*DEFAULT_KEY);
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::CredentialError(format!("{CRYPT_KEY_ENV} is not base64: {e}")))?;

    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        AppError::CredentialError(format!(
            "{CRYPT_KEY_ENV} must decode to 32 bytes, got {}",
            bytes.len()
        ))
    })
}

fn encrypt_with(key: &[u8; 32], plain: &str) -> AppResult<String> {
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), plain.as_bytes())
        .map_err(|e| AppError::CredentialError(format!("encryption failed: {e}")))?;

    let mut data = nonce.to_vec();
    data.extend_from_slice(&ciphertext);

    Ok(format!(
        "{CIPHERTEXT_PREFIX}{}",
        base64::engine::general_purpose::STANDARD.encode(data)
    ))
}

fn decrypt_with(key: &[u8; 32], encoded: &str) -> AppResult<String> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::CredentialError(format!("invalid base64: {e}")))?;

    if data.len() <= NONCE_LEN {
        return Err(AppError::CredentialError(
            "encrypted value too short".to_string(),
        ));
    }

    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key));

    let plain = cipher
        .decrypt(GenericArray::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::CredentialError("decryption failed (wrong key?)".to_string()))?;

    String::from_utf8(plain)
        .map_err(|_| AppError::CredentialError("decrypted value is not UTF-8".to_string()))
}
