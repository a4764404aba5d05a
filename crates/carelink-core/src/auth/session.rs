use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::crypto::SessionCipher;
use crate::cache::SlotStorage;
use crate::clock::Clock;

/// Storage key of the single session slot
pub const SESSION_KEY: &str = "session";

/// Records last written longer ago than this are treated as absent.
pub const FRESHNESS_WINDOW_DAYS: i64 = 15;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Stored session is unreadable: {0}")]
    Corruption(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Storage error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl Tokens {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Keep tokens out of logs
impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The persisted session. Every field is optional; `SessionRecord::default()`
/// is "no session".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Tokens>,
    /// Last write, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Last successful token refresh, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<i64>,
}

impl SessionRecord {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn merge(mut self, patch: SessionPatch) -> Self {
        if let Some(user) = patch.user {
            self.user = Some(user);
        }
        if let Some(profile) = patch.profile {
            self.profile = Some(profile);
        }
        if let Some(settings) = patch.settings {
            self.settings = Some(settings);
        }
        if let Some(tokens) = patch.tokens {
            self.tokens = Some(tokens);
        }
        if let Some(last_refresh) = patch.last_refresh {
            self.last_refresh = Some(last_refresh);
        }
        self
    }
}

/// Partial update for `SessionCache::set`. `Some` overwrites, `None` keeps.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub user: Option<Value>,
    pub profile: Option<Value>,
    pub settings: Option<Value>,
    pub tokens: Option<Tokens>,
    pub last_refresh: Option<i64>,
}

impl SessionPatch {
    pub fn user(mut self, user: Value) -> Self {
        self.user = Some(user);
        self
    }

    pub fn profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn settings(mut self, settings: Value) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn tokens(mut self, tokens: Tokens) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn last_refresh(mut self, at_millis: i64) -> Self {
        self.last_refresh = Some(at_millis);
        self
    }
}

/// Encrypted single-slot session store with a freshness window.
///
/// Clones share state. Instances built over the same storage backend but
/// not cloned from each other behave like separate browser tabs: no
/// coordination, last write wins.
#[derive(Clone)]
pub struct SessionCache {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn SlotStorage>,
    cipher: SessionCipher,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    // Serializes read-merge-write within this instance
    write_lock: Mutex<()>,
}

impl SessionCache {
    pub fn new(storage: Arc<dyn SlotStorage>, cipher: SessionCipher, clock: Arc<dyn Clock>) -> Self {
        Self::with_freshness_window(storage, cipher, clock, Duration::days(FRESHNESS_WINDOW_DAYS))
    }

    pub fn with_freshness_window(
        storage: Arc<dyn SlotStorage>,
        cipher: SessionCipher,
        clock: Arc<dyn Clock>,
        freshness: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                cipher,
                clock,
                freshness,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn freshness_window(&self) -> Duration {
        self.inner.freshness
    }

    /// Read and decrypt the stored record.
    ///
    /// `Ok(None)` when nothing is stored or the record has outlived the
    /// freshness window (the slot is cleared in that case).
    pub fn load(&self) -> Result<Option<SessionRecord>, CacheError> {
        let Some(blob) = self.inner.storage.read(SESSION_KEY)? else {
            return Ok(None);
        };
        let plaintext = self.inner.cipher.decrypt(&blob)?;
        let record: SessionRecord = serde_json::from_slice(&plaintext)
            .map_err(|e| CacheError::Corruption(format!("invalid session json: {}", e)))?;

        if !self.is_fresh(&record) {
            debug!(timestamp = ?record.timestamp, "Session outside freshness window, evicting");
            self.clear();
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Current record, or the empty record when there is no usable session.
    /// Unreadable blobs are logged and evicted.
    pub fn get(&self) -> SessionRecord {
        match self.load() {
            Ok(Some(record)) => record,
            Ok(None) => SessionRecord::default(),
            Err(CacheError::Io(e)) => {
                warn!(error = %e, "Failed to read session slot");
                SessionRecord::default()
            }
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session");
                self.clear();
                SessionRecord::default()
            }
        }
    }

    /// Merge `patch` over the current record, stamp it and persist it.
    pub fn try_set(&self, patch: SessionPatch) -> Result<SessionRecord, CacheError> {
        let _guard = self.inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let current = self.get();
        let now = self.inner.clock.now_millis();
        // Never move the timestamp backwards, even if the clock does
        let timestamp = current.timestamp.map_or(now, |prev| prev.max(now));

        let mut record = current.merge(patch);
        record.timestamp = Some(timestamp);

        let plaintext = serde_json::to_vec(&record)?;
        let blob = self.inner.cipher.encrypt(&plaintext)?;
        self.inner.storage.write(SESSION_KEY, &blob)?;
        Ok(record)
    }

    /// Best-effort `try_set`: failures are logged and dropped.
    pub fn set(&self, patch: SessionPatch) {
        if let Err(e) = self.try_set(patch) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Remove the stored session. Idempotent.
    pub fn clear(&self) {
        if let Err(e) = self.inner.storage.remove(SESSION_KEY) {
            warn!(error = %e, "Failed to clear session slot");
        }
    }

    /// True when an access token is cached and the record is fresh.
    pub fn is_token_valid(&self) -> bool {
        let record = self.get();
        record
            .tokens
            .as_ref()
            .is_some_and(|t| !t.access_token.is_empty())
            && self.is_fresh(&record)
    }

    /// The cached access token; an empty string counts as none.
    pub fn access_token(&self) -> Option<String> {
        self.get()
            .tokens
            .map(|t| t.access_token)
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get()
            .tokens
            .map(|t| t.refresh_token)
            .filter(|t| !t.is_empty())
    }

    pub fn user(&self) -> Option<Value> {
        self.get().user
    }

    fn is_fresh(&self, record: &SessionRecord) -> bool {
        match record.timestamp {
            Some(written) => {
                let age_ms = self.inner.clock.now_millis() - written;
                age_ms < self.inner.freshness.num_milliseconds()
            }
            None => false,
        }
    }
}
