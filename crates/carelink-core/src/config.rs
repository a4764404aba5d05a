//! Client configuration.
//!
//! Stored at `~/.config/carelink/config.json`. Environment variables
//! override the file:
//!
//! - `CARELINK_API_URL`: backend base URL
//! - `CARELINK_CACHE_DIR`: directory holding the encrypted session slot
//! - `CARELINK_CACHE_SECRET`: passphrase for the cache key, used instead
//!   of the keychain

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::FRESHNESS_WINDOW_DAYS;
use crate::cache::DEFAULT_TTL_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "carelink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const ENV_API_URL: &str = "CARELINK_API_URL";
pub const ENV_CACHE_DIR: &str = "CARELINK_CACHE_DIR";
pub const ENV_CACHE_SECRET: &str = "CARELINK_CACHE_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub freshness_days: i64,
    pub ttl_secs: i64,
    pub cache_dir: Option<PathBuf>,
    pub last_email: Option<String>,
    /// Never written to disk; only taken from the environment
    #[serde(skip)]
    pub cache_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            freshness_days: FRESHNESS_WINDOW_DAYS,
            ttl_secs: DEFAULT_TTL_SECS,
            cache_dir: None,
            last_email: None,
            cache_secret: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(secret) = non_empty(ENV_CACHE_SECRET) {
            self.cache_secret = Some(secret);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.freshness_days)
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.freshness_window(), chrono::Duration::days(15));
        assert_eq!(config.ttl(), chrono::Duration::seconds(30));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"api_base_url": "https://portal.example/api"}"#).unwrap();
        assert_eq!(config.api_base_url, "https://portal.example/api");
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_API_URL => Some("https://override.example".to_string()),
            ENV_CACHE_DIR => Some("/tmp/carelink-test".to_string()),
            ENV_CACHE_SECRET => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://override.example");
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/tmp/carelink-test"));
        assert_eq!(config.cache_secret, None, "blank secret is ignored");
    }

    #[test]
    fn test_secret_is_never_serialized() {
        let config = Config {
            cache_secret: Some("hunter2".to_string()),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
