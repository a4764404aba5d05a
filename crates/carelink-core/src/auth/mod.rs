//! Authentication state for the portal client.
//!
//! This module provides:
//! - `SessionCache`: encrypted single-slot session record with a 15-day freshness window
//! - `RefreshCoordinator`: single-flight access token refresh
//! - `Role` / `has_access`: the role hierarchy guard used by services
//! - `KeyStore`: the cache encryption key in the OS keychain

pub mod credentials;
pub mod crypto;
pub mod refresh;
pub mod roles;
pub mod session;

pub use credentials::KeyStore;
pub use crypto::SessionCipher;
pub use refresh::{RefreshCoordinator, RefreshError, RefreshFn};
pub use roles::{has_access, role_rank, Role};
pub use session::{CacheError, SessionCache, SessionPatch, SessionRecord, Tokens, FRESHNESS_WINDOW_DAYS};
