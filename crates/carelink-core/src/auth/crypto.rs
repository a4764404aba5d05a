//! Symmetric encryption of the persisted session blob.
//!
//! Blob layout: `v1:` followed by base64 of `nonce (24 bytes) || ciphertext`,
//! sealed with XChaCha20-Poly1305.

use argon2::Argon2;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::session::CacheError;

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

const BLOB_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 24;
pub const KEY_LEN: usize = 32;

/// Fixed salt for passphrase-derived keys. The passphrase is the secret;
/// the salt only separates this use of it from others.
const KDF_SALT: &[u8] = b"carelink-session-cache-v1";

pub struct SessionCipher {
    aead: XChaCha20Poly1305,
}

impl SessionCipher {
    pub fn from_key(key: &[u8; KEY_LEN]) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Derive the key from a passphrase with Argon2id.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CacheError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), KDF_SALT, &mut key)
            .map_err(|e| CacheError::Encryption(format!("key derivation failed: {}", e)))?;
        Ok(Self::from_key(&key))
    }

    /// Fresh random key, for callers that keep it somewhere themselves.
    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CacheError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .aead
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| CacheError::Encryption(format!("encryption failed: {:?}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", BLOB_PREFIX, BASE64.encode(sealed)))
    }

    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, CacheError> {
        let encoded = blob
            .strip_prefix(BLOB_PREFIX)
            .ok_or_else(|| CacheError::Corruption("unknown blob format".into()))?;
        let sealed = BASE64
            .decode(encoded.trim())
            .map_err(|e| CacheError::Corruption(format!("invalid base64: {}", e)))?;
        if sealed.len() <= NONCE_LEN {
            return Err(CacheError::Corruption(format!(
                "blob too short: {} bytes",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.aead
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CacheError::Corruption("decryption failed".into()))
    }
}
