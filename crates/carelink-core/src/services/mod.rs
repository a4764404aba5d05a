//! Thin wrappers over the portal's REST endpoints.
//!
//! Each service holds a cheap clone of the `ApiClient`. Services that act on
//! other users check the caller's cached role with `require_role` before
//! sending anything.

pub mod auth;
pub mod media;
pub mod memo;
pub mod pregnancy;
pub mod settings;
pub mod users;

use chrono::Duration;

pub use auth::AuthService;
pub use media::MediaService;
pub use memo::SessionMemo;
pub use pregnancy::PregnancyService;
pub use settings::SettingsService;
pub use users::UserService;

use crate::api::{ApiClient, ApiError};
use crate::auth::{Role, SessionCache};

/// Role of the signed-in user, as recorded in the session cache.
pub fn cached_role(session: &SessionCache) -> Option<Role> {
    session
        .user()?
        .get("role")?
        .as_str()?
        .parse()
        .ok()
}

/// Fail unless the signed-in user ranks at least `required`.
pub fn require_role(session: &SessionCache, required: Role) -> Result<Role, ApiError> {
    if session.user().is_none() {
        return Err(ApiError::AuthenticationRequired("no active session".to_string()));
    }
    match cached_role(session) {
        Some(actual) if actual.has_access(required) => Ok(actual),
        Some(actual) => Err(ApiError::AccessDenied(format!(
            "{} role required, signed in as {}",
            required, actual
        ))),
        None => Err(ApiError::AccessDenied(format!("{} role required", required))),
    }
}

/// All services over one client.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub users: UserService,
    pub pregnancy: PregnancyService,
    pub media: MediaService,
    pub settings: SettingsService,
}

impl Services {
    /// Services sharing one response memo, so signing in or out drops
    /// every memoized response at once.
    pub fn new(api: ApiClient, ttl: Duration) -> Self {
        let memo = SessionMemo::new(api.session().clone(), ttl);
        Self {
            auth: AuthService::new(api.clone(), memo.clone()),
            users: UserService::new(api.clone()),
            pregnancy: PregnancyService::new(api.clone()),
            media: MediaService::new(api.clone()),
            settings: SettingsService::new(api, memo),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::auth::{SessionCipher, SessionPatch};
    use crate::cache::MemoryStorage;
    use crate::clock::ManualClock;

    fn session_with_user(user: Option<serde_json::Value>) -> SessionCache {
        let session = SessionCache::new(
            Arc::new(MemoryStorage::new()),
            SessionCipher::from_key(&[4u8; 32]),
            Arc::new(ManualClock::default()),
        );
        if let Some(user) = user {
            session.set(SessionPatch::default().user(user));
        }
        session
    }

    #[test]
    fn test_require_role_allows_higher_rank() {
        let session = session_with_user(Some(json!({"id": 1, "role": "SUPER_ADMIN"})));
        assert_eq!(require_role(&session, Role::Admin).unwrap(), Role::SuperAdmin);
    }

    #[test]
    fn test_require_role_denies_lower_rank() {
        let session = session_with_user(Some(json!({"id": 1, "role": "PATIENT"})));
        assert!(matches!(require_role(&session, Role::Doctor), Err(ApiError::AccessDenied(_))));
    }

    #[test]
    fn test_require_role_without_session() {
        let session = session_with_user(None);
        assert!(require_role(&session, Role::Patient).unwrap_err().is_auth_required());
    }

    #[test]
    fn test_unknown_role_is_denied() {
        let session = session_with_user(Some(json!({"id": 1, "role": "NURSE"})));
        assert!(matches!(require_role(&session, Role::Patient), Err(ApiError::AccessDenied(_))));
    }
}
