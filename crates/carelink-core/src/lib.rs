//! carelink core library.
//!
//! Client-side session layer for the carelink patient portal:
//!
//! - `auth`: encrypted single-slot `SessionCache`, single-flight token
//!   refresh, role hierarchy, keyring-backed cache key
//! - `api`: `ApiClient` with bearer auth, 401 refresh-and-retry and 429 backoff
//! - `cache`: storage backends and a TTL memoization cache
//! - `services`: thin wrappers over the portal's REST endpoints
//! - `models`: request/response types for those endpoints

pub mod api;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod models;
pub mod services;

pub use api::{ApiClient, ApiError};
pub use auth::{has_access, Role, SessionCache, SessionPatch, SessionRecord, Tokens};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
