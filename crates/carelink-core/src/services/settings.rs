use serde_json::{json, Value};
use tracing::debug;

use super::SessionMemo;
use crate::api::{ApiClient, ApiError};
use crate::auth::SessionPatch;
use crate::models::{merge_json, ProfileUpdate};

const SETTINGS_PATH: &str = "/settings";
const PROFILE_PATH: &str = "/settings/profile";

/// Account settings and the editable profile.
///
/// Settings live in one flat object, mirrored into the session cache's
/// `settings` field; the profile goes to its `profile` field.
#[derive(Clone)]
pub struct SettingsService {
    api: ApiClient,
    memo: SessionMemo,
}

impl SettingsService {
    pub fn new(api: ApiClient, memo: SessionMemo) -> Self {
        Self { api, memo }
    }

    pub async fn get_settings(&self) -> Result<Value, ApiError> {
        self.memo
            .get_or_fetch(SETTINGS_PATH, || async {
                let settings: Value = self.api.get(SETTINGS_PATH).await?;
                self.api
                    .session()
                    .set(SessionPatch::default().settings(settings.clone()));
                Ok::<_, ApiError>(settings)
            })
            .await
    }

    /// Send a partial update and merge the result into the cached settings.
    pub async fn update_settings(&self, patch: &Value) -> Result<Value, ApiError> {
        let returned: Value = self.api.patch(SETTINGS_PATH, patch).await?;

        let mut merged = self.api.session().get().settings.unwrap_or_else(|| json!({}));
        // No settings object echoed back: apply the patch as sent
        let applied = if returned.is_object() { &returned } else { patch };
        merge_json(&mut merged, applied);

        self.api
            .session()
            .set(SessionPatch::default().settings(merged.clone()));
        self.memo.invalidate(SETTINGS_PATH);
        debug!("Settings updated");
        Ok(merged)
    }

    pub async fn get_profile(&self) -> Result<Value, ApiError> {
        self.memo
            .get_or_fetch(PROFILE_PATH, || async {
                let profile: Value = self.api.get(PROFILE_PATH).await?;
                self.api
                    .session()
                    .set(SessionPatch::default().profile(profile.clone()));
                Ok::<_, ApiError>(profile)
            })
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Value, ApiError> {
        let profile: Value = self.api.put(PROFILE_PATH, update).await?;
        self.api
            .session()
            .set(SessionPatch::default().profile(profile.clone()));
        self.memo.invalidate(PROFILE_PATH);
        Ok(profile)
    }

    /// Settings as last cached, without a request.
    pub fn cached_settings(&self) -> Option<Value> {
        self.api.session().get().settings
    }
}
