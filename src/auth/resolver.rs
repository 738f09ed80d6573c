use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::provider::{AccessToken, AcquireOutcome, IdentityProvider};
use crate::auth::session::keys;
use crate::observability::metrics::get_metrics;
use crate::store::settings_store::SettingsStore;

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_CANCELLED: &str = "cancelled";
pub const OUTCOME_FAILURE: &str = "failure";

/// Mints bearer tokens through the identity provider and anchors the
/// session (authority, tenant, user) in the settings store on every
/// success, so a later run defaults to the same authority without
/// re-prompting.
#[derive(Debug)]
pub struct TokenResolver<P> {
    provider: Arc<P>,
    settings: Arc<SettingsStore>,
}

impl<P: IdentityProvider> TokenResolver<P> {
    pub fn new(provider: Arc<P>, settings: Arc<SettingsStore>) -> Self {
        Self { provider, settings }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Token for `resource_id`, or None on failure or cancellation.
    /// Session state is only mutated on success.
    pub async fn acquire_token(&self, resource_id: &str) -> Option<AccessToken> {
        let metrics = get_metrics().await;

        match self.provider.acquire(resource_id).await {
            Ok(AcquireOutcome::Success { token, identity }) => {
                let anchor = [
                    (keys::LOGGED_IN_USER, identity.user_id.as_str()),
                    (keys::TENANT_ID, identity.tenant_id.as_str()),
                    (keys::LAST_AUTHORITY, identity.authority.as_str()),
                ];
                for (key, value) in anchor {
                    if let Err(err) = self.settings.set(key, value).await {
                        warn!("could not persist session anchor '{key}': {err}");
                    }
                }
                metrics
                    .token_acquisitions
                    .with_label_values(&[OUTCOME_SUCCESS])
                    .inc();
                Some(token)
            }
            Ok(AcquireOutcome::Cancelled) => {
                info!("token acquisition for '{resource_id}' cancelled by the user");
                metrics
                    .token_acquisitions
                    .with_label_values(&[OUTCOME_CANCELLED])
                    .inc();
                None
            }
            Err(err) => {
                warn!("token acquisition for '{resource_id}' failed: {err}");
                metrics
                    .token_acquisitions
                    .with_label_values(&[OUTCOME_FAILURE])
                    .inc();
                None
            }
        }
    }
}
