//! Single-flight access token refresh.
//!
//! However many requests hit a 401 at once, one refresh call goes out and
//! every caller awaits its result.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::session::{SessionCache, SessionPatch, Tokens};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh token rejected: {0}")]
    Rejected(String),
}

/// Performs the network call that exchanges a refresh token for new tokens.
pub type RefreshFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Tokens, RefreshError>> + Send + Sync>;

type SharedRefresh = Shared<BoxFuture<'static, Result<Tokens, RefreshError>>>;

enum RefreshState {
    Idle,
    Refreshing { generation: u64, task: SharedRefresh },
}

struct StateSlot {
    state: RefreshState,
    next_generation: u64,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    cache: SessionCache,
    refresher: RefreshFn,
    slot: Arc<Mutex<StateSlot>>,
}

impl RefreshCoordinator {
    pub fn new(cache: SessionCache, refresher: RefreshFn) -> Self {
        Self {
            cache,
            refresher,
            slot: Arc::new(Mutex::new(StateSlot {
                state: RefreshState::Idle,
                next_generation: 0,
            })),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        matches!(slot.state, RefreshState::Refreshing { .. })
    }

    /// Refresh the tokens, joining the refresh already in flight if there is one.
    ///
    /// On success the new tokens are in the session cache. On failure the
    /// session cache has been cleared.
    pub async fn refresh(&self) -> Result<Tokens, RefreshError> {
        let task = {
            let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            let in_flight = match &slot.state {
                RefreshState::Refreshing { generation, task } => Some((*generation, task.clone())),
                RefreshState::Idle => None,
            };
            match in_flight {
                Some((generation, task)) => {
                    debug!(generation, "Joining in-flight token refresh");
                    task
                }
                None => {
                    let generation = slot.next_generation;
                    slot.next_generation += 1;
                    let task = self.start(generation).shared();
                    slot.state = RefreshState::Refreshing {
                        generation,
                        task: task.clone(),
                    };
                    task
                }
            }
        };
        task.await
    }

    fn start(&self, generation: u64) -> BoxFuture<'static, Result<Tokens, RefreshError>> {
        let cache = self.cache.clone();
        let refresher = Arc::clone(&self.refresher);
        let slot = Arc::clone(&self.slot);

        async move {
            // Back to Idle however this future ends
            let _reset = ResetOnDrop { slot, generation };

            let Some(refresh_token) = cache.refresh_token() else {
                warn!("Token refresh requested without a refresh token");
                cache.clear();
                return Err(RefreshError::MissingRefreshToken);
            };

            info!(generation, "Refreshing access token");
            match (*refresher)(refresh_token).await {
                Ok(tokens) => {
                    let now = cache.clock().now_millis();
                    cache.set(SessionPatch::default().tokens(tokens.clone()).last_refresh(now));
                    Ok(tokens)
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, clearing session");
                    cache.clear();
                    Err(e)
                }
            }
        }
        .boxed()
    }
}

struct ResetOnDrop {
    slot: Arc<Mutex<StateSlot>>,
    generation: u64,
}

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.state, RefreshState::Refreshing { generation, .. } if generation == self.generation)
        {
            slot.state = RefreshState::Idle;
        }
    }
}
