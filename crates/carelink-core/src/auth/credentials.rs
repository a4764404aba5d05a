use anyhow::{anyhow, Context, Result};
use base64::Engine;
use keyring::Entry;
use tracing::info;

use super::crypto::{SessionCipher, KEY_LEN};

const SERVICE_NAME: &str = "carelink";
const CACHE_KEY_ENTRY: &str = "session-cache-key";

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Session cache encryption key kept in the OS keychain.
pub struct KeyStore;

impl KeyStore {
    /// Load the cache key, generating and storing one on first use.
    pub fn load_or_create() -> Result<[u8; KEY_LEN]> {
        let entry = Self::entry()?;
        match entry.get_password() {
            Ok(encoded) => Self::decode(&encoded),
            Err(keyring::Error::NoEntry) => {
                let key = SessionCipher::generate_key();
                entry
                    .set_password(&BASE64.encode(key))
                    .context("Failed to store cache key in keychain")?;
                info!("Generated new session cache key");
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to read cache key from keychain"),
        }
    }

    /// Forget the cache key. Any stored session becomes unreadable.
    pub fn delete() -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete cache key from keychain"),
        }
    }

    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, CACHE_KEY_ENTRY).context("Failed to create keyring entry")
    }

    fn decode(encoded: &str) -> Result<[u8; KEY_LEN]> {
        let bytes = BASE64
            .decode(encoded.trim())
            .context("Cache key in keychain is not valid base64")?;
        bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("Cache key has {} bytes, expected {}", b.len(), KEY_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_stored_format() {
        let key = [5u8; KEY_LEN];
        assert_eq!(KeyStore::decode(&BASE64.encode(key)).unwrap(), key);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(KeyStore::decode(&BASE64.encode([1u8; 16])).is_err());
        assert!(KeyStore::decode("not base64!").is_err());
    }
}
