use serde_json::Value;
use tracing::{info, warn};

use super::SessionMemo;
use crate::api::client::{CURRENT_USER_PATH, LOGIN_PATH, LOGOUT_PATH};
use crate::api::{ApiClient, ApiError};
use crate::auth::{Role, SessionPatch};
use crate::models::{LoginRequest, LoginResponse, User};

const CURRENT_USER_KEY: &str = "current_user";

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    memo: SessionMemo,
}

impl AuthService {
    pub fn new(api: ApiClient, memo: SessionMemo) -> Self {
        Self { api, memo }
    }

    /// Exchange credentials for tokens and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let response: LoginResponse = self
            .api
            .post_public(LOGIN_PATH, &LoginRequest { email, password })
            .await?;

        let user: User = serde_json::from_value(response.user.clone())
            .map_err(|e| ApiError::InvalidResponse(format!("invalid user in login response: {}", e)))?;

        let session = self.api.session();
        let now = session.clock().now_millis();
        session.set(
            SessionPatch::default()
                .user(response.user)
                .tokens(response.tokens)
                .last_refresh(now),
        );
        self.memo.clear();

        info!(user_id = user.id, "Logged in");
        Ok(user)
    }

    /// End the session. The server call is best-effort; the local session
    /// is cleared regardless.
    pub async fn logout(&self) {
        // The server revokes the refresh token, so send even without an access token
        if self.api.session().refresh_token().is_some() {
            if let Err(e) = self.api.post_empty(LOGOUT_PATH, &serde_json::json!({})).await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }
        self.api.session().clear();
        self.memo.clear();
        info!("Logged out");
    }

    /// The signed-in user from the backend, memoized for the TTL.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let raw = self
            .memo
            .get_or_fetch(CURRENT_USER_KEY, || async {
                let user: Value = self.api.get(CURRENT_USER_PATH).await?;
                self.api.session().set(SessionPatch::default().user(user.clone()));
                Ok::<_, ApiError>(user)
            })
            .await?;
        serde_json::from_value(raw)
            .map_err(|e| ApiError::InvalidResponse(format!("invalid user: {}", e)))
    }

    /// The user recorded in the session cache, without a request.
    pub fn cached_user(&self) -> Option<User> {
        serde_json::from_value(self.api.session().user()?).ok()
    }

    pub fn role(&self) -> Option<Role> {
        self.cached_user().and_then(|u| u.role())
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.session().is_token_valid()
    }
}
