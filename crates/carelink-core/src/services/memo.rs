use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde_json::Value;
use tracing::debug;

use crate::api::ApiError;
use crate::auth::SessionCache;
use crate::cache::TtlCache;

/// Response memo shared by every service over one session.
///
/// Entries belong to the signed-in user: the whole memo is dropped on
/// login and logout, and before any read once the session no longer holds
/// a valid token (expiry, or a refresh that failed and cleared it).
#[derive(Clone)]
pub struct SessionMemo {
    session: SessionCache,
    entries: Arc<TtlCache<&'static str, Value>>,
}

impl SessionMemo {
    pub fn new(session: SessionCache, ttl: Duration) -> Self {
        let clock = session.clock().clone();
        Self {
            session,
            entries: Arc::new(TtlCache::new(ttl, clock)),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &'static str, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        if !self.session.is_token_valid() {
            debug!(key, "No valid session, dropping memoized responses");
            self.entries.clear();
        }
        self.entries.get_or_try_insert_with(key, fetch).await
    }

    pub fn invalidate(&self, key: &'static str) {
        self.entries.invalidate(&key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::auth::{SessionCipher, SessionPatch, Tokens};
    use crate::cache::MemoryStorage;
    use crate::clock::ManualClock;

    fn memo() -> (SessionMemo, SessionCache) {
        let session = SessionCache::new(
            Arc::new(MemoryStorage::new()),
            SessionCipher::from_key(&[9u8; 32]),
            Arc::new(ManualClock::default()),
        );
        session.set(SessionPatch::default().tokens(Tokens::new("access", "refresh")));
        (SessionMemo::new(session.clone(), Duration::seconds(30)), session)
    }

    #[tokio::test]
    async fn test_hit_while_session_valid() {
        let (memo, _session) = memo();
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let value = memo
                .get_or_fetch("settings", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(json!({"language": "en"}))
                })
                .await
                .unwrap();
            assert_eq!(value["language"], "en");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleared_session_drops_entries() {
        let (memo, session) = memo();
        memo.get_or_fetch("settings", || async { Ok::<_, ApiError>(json!({"language": "en"})) })
            .await
            .unwrap();

        session.clear();
        let err = memo
            .get_or_fetch("settings", || async {
                Err(ApiError::AuthenticationRequired("no active session".to_string()))
            })
            .await
            .unwrap_err();
        assert!(err.is_auth_required());
    }
}
