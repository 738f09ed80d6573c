use std::sync::Arc;

use crate::store::settings_store::SettingsStore;

/// Keys of the persisted session anchor.
pub mod keys {
    pub const LAST_AUTHORITY: &str = "LastAuthority";
    pub const TENANT_ID: &str = "TenantId";
    pub const LOGGED_IN_USER: &str = "LoggedInUser";
    pub const REFRESH_TOKEN: &str = "RefreshToken";
}

/// Read view over the persisted auth session. Absent values read as empty
/// strings; sign-out clears TenantId and LastAuthority but keeps
/// LoggedInUser so a failed logout can be retried.
#[derive(Debug, Clone)]
pub struct AuthSession {
    settings: Arc<SettingsStore>,
}

impl AuthSession {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn last_authority(&self) -> String {
        self.settings.get(keys::LAST_AUTHORITY).await.unwrap_or_default()
    }

    pub async fn tenant_id(&self) -> String {
        self.settings.get(keys::TENANT_ID).await.unwrap_or_default()
    }

    pub async fn logged_in_user(&self) -> String {
        self.settings.get(keys::LOGGED_IN_USER).await.unwrap_or_default()
    }
}
