use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::session::keys;
use crate::error::{AgentError, AgentResult};
use crate::store::settings_store::SettingsStore;
use crate::utils::time::now_i64;

/// Cached tokens count as expired this many seconds early so a token handed
/// to a resource call does not lapse mid-flight.
const TOKEN_SAFETY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: i64, // UNIX timestamp
}

/// Who the provider authenticated, and against which authority.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub tenant_id: String,
    pub authority: String,
}

#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Success { token: AccessToken, identity: Identity },
    Cancelled,
}

/// Identity provider boundary: combined silent-then-interactive acquisition
/// behind a single call. The trait is the seam tests substitute a fake at.
pub trait IdentityProvider: Send + Sync {
    fn acquire(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = AgentResult<AcquireOutcome>> + Send;

    fn logout(&self, user_id: &str) -> impl Future<Output = AgentResult<()>> + Send;

    fn clear_token_cache(&self) -> impl Future<Output = ()> + Send;
}

/// Azure AD provider. Silent paths first: an unexpired access token from the
/// in-memory cache, then a refresh-token grant. Interactive fallback is the
/// OAuth2 device-code flow. Refresh tokens persist in the settings store so
/// a later run can still sign in silently.
#[derive(Debug, Clone)]
pub struct AadProvider {
    client_id: String,
    authority: String,
    http: Client,
    settings: Arc<SettingsStore>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    identity: Arc<RwLock<Option<Identity>>>,
}

impl AadProvider {
    pub fn new(
        client_id: impl Into<String>,
        authority: impl Into<String>,
        http: Client,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            authority: authority.into(),
            http,
            settings,
            access_tokens: Arc::new(RwLock::new(HashMap::new())),
            identity: Arc::new(RwLock::new(None)),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.authority.trim_end_matches('/'))
    }

    fn device_code_url(&self) -> String {
        format!("{}/oauth2/devicecode", self.authority.trim_end_matches('/'))
    }

    fn logout_url(&self) -> String {
        format!("{}/oauth2/logout", self.authority.trim_end_matches('/'))
    }

    async fn cached_token(&self, resource_id: &str) -> Option<(AccessToken, Identity)> {
        let token = self
            .access_tokens
            .read()
            .await
            .get(resource_id)
            .cloned()
            .filter(|t| now_i64() < t.expires_at - TOKEN_SAFETY_MARGIN_SECS)?;
        let identity = self.identity.read().await.clone()?;
        Some((token, identity))
    }

    /// Redeem the stored refresh token for `resource_id`. Any failure falls
    /// back to the interactive flow, so errors are logged and swallowed.
    async fn try_refresh(&self, resource_id: &str) -> Option<(AccessToken, Identity)> {
        let refresh_token = self.settings.get(keys::REFRESH_TOKEN).await?;

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("resource", resource_id),
        ];
        let response = match self.http.post(self.token_url()).form(&form).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("refresh token request failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            // invalid_grant and friends: interactive sign-in required
            debug!("refresh grant rejected: {}", response.status());
            return None;
        }

        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!("refresh grant response malformed: {err}");
                return None;
            }
        };
        Some(self.adopt_grant(resource_id, body).await)
    }

    /// Record a successful grant: cache the access token, remember who we
    /// are, rotate the stored refresh token when a new one was issued.
    async fn adopt_grant(&self, resource_id: &str, body: TokenResponse) -> (AccessToken, Identity) {
        let expires_in = body
            .expires_in
            .as_ref()
            .and_then(Numberish::as_i64)
            .unwrap_or(3600);
        let token = AccessToken {
            value: body.access_token.clone(),
            expires_at: now_i64() + expires_in,
        };

        let claims = body.id_token.as_deref().and_then(decode_id_token_claims);
        let prior = self.identity.read().await.clone();
        let identity = match (claims, prior) {
            (Some(claims), _) => Identity {
                user_id: claims.oid.or(claims.upn).unwrap_or_default(),
                tenant_id: claims.tid.unwrap_or_default(),
                authority: self.authority.clone(),
            },
            (None, Some(prior)) => prior,
            (None, None) => Identity {
                user_id: String::new(),
                tenant_id: String::new(),
                authority: self.authority.clone(),
            },
        };

        self.access_tokens
            .write()
            .await
            .insert(resource_id.to_owned(), token.clone());
        *self.identity.write().await = Some(identity.clone());

        if let Some(refresh_token) = &body.refresh_token {
            // the provider may rotate refresh tokens, always keep the latest
            if let Err(err) = self.settings.set(keys::REFRESH_TOKEN, refresh_token).await {
                warn!("could not persist refresh token: {err}");
            }
        }

        (token, identity)
    }

    async fn device_code_sign_in(&self, resource_id: &str) -> AgentResult<AcquireOutcome> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("resource", resource_id),
        ];
        let response = self
            .http
            .post(self.device_code_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| AgentError::AuthFailed(format!("device code request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AgentError::AuthFailed(format!(
                "device code request rejected: {}",
                response.status()
            )));
        }
        let dev: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| AgentError::AuthFailed(format!("device code response malformed: {e}")))?;

        match &dev.message {
            Some(message) => println!("{message}"),
            None => println!(
                "Open {} and enter code {}",
                dev.verification_url, dev.user_code
            ),
        }
        info!("waiting for device sign-in (code {})", dev.user_code);

        let mut interval = dev.interval.unwrap_or(5);
        let expires_in = dev
            .expires_in
            .as_ref()
            .and_then(Numberish::as_i64)
            .unwrap_or(900)
            .max(0) as u64;
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(expires_in.saturating_sub(5));

        loop {
            if tokio::time::Instant::now() > deadline {
                info!("device code expired before sign-in completed");
                return Ok(AcquireOutcome::Cancelled);
            }

            let response = self
                .http
                .post(self.token_url())
                .form(&[
                    ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                    ("client_id", self.client_id.as_str()),
                    ("code", dev.device_code.as_str()),
                    ("resource", resource_id),
                ])
                .send()
                .await
                .map_err(|e| AgentError::AuthFailed(format!("token poll failed: {e}")))?;

            if response.status().is_success() {
                let body: TokenResponse = response.json().await.map_err(|e| {
                    AgentError::AuthFailed(format!("token response malformed: {e}"))
                })?;
                let (token, identity) = self.adopt_grant(resource_id, body).await;
                return Ok(AcquireOutcome::Success { token, identity });
            }

            let err: TokenErrorResponse = response.json().await.unwrap_or_else(|_| {
                TokenErrorResponse {
                    error: "unknown_error".into(),
                    error_description: None,
                }
            });
            match err.error.as_str() {
                "authorization_pending" => {
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                }
                "slow_down" => {
                    interval += 2;
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                }
                "expired_token" | "code_expired" | "authorization_declined" => {
                    info!("sign-in cancelled: {}", err.error);
                    return Ok(AcquireOutcome::Cancelled);
                }
                other => {
                    return Err(AgentError::AuthFailed(format!(
                        "device code grant failed: {other} {:?}",
                        err.error_description
                    )));
                }
            }
        }
    }
}

impl IdentityProvider for AadProvider {
    async fn acquire(&self, resource_id: &str) -> AgentResult<AcquireOutcome> {
        if resource_id.is_empty() {
            return Err(AgentError::InvalidArgument(
                "resource id must not be empty".into(),
            ));
        }

        if let Some((token, identity)) = self.cached_token(resource_id).await {
            debug!("reusing cached access token for '{resource_id}'");
            return Ok(AcquireOutcome::Success { token, identity });
        }
        if let Some((token, identity)) = self.try_refresh(resource_id).await {
            debug!("silent refresh succeeded for '{resource_id}'");
            return Ok(AcquireOutcome::Success { token, identity });
        }
        self.device_code_sign_in(resource_id).await
    }

    async fn logout(&self, user_id: &str) -> AgentResult<()> {
        info!("logging out '{user_id}'");
        let response = self
            .http
            .get(self.logout_url())
            .send()
            .await
            .map_err(|e| AgentError::AuthFailed(format!("logout request failed: {e}")))?;
        if !response.status().is_success() && !response.status().is_redirection() {
            return Err(AgentError::AuthFailed(format!(
                "logout rejected: {}",
                response.status()
            )));
        }
        *self.identity.write().await = None;
        Ok(())
    }

    async fn clear_token_cache(&self) {
        self.access_tokens.write().await.clear();
        if let Err(err) = self.settings.remove(keys::REFRESH_TOKEN).await {
            warn!("could not clear stored refresh token: {err}");
        }
    }
}

/// AAD v1 token endpoints return numeric fields as strings; mocks and newer
/// endpoints return numbers. Accept both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Numberish {
    Num(i64),
    Text(String),
}

impl Numberish {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Numberish::Num(n) => Some(*n),
            Numberish::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Numberish>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_url: String,
    #[serde(default)]
    expires_in: Option<Numberish>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    tid: Option<String>,
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    upn: Option<String>,
}

fn decode_id_token_claims(id_token: &str) -> Option<IdTokenClaims> {
    let payload = id_token.split('.').nth(1)?;
    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&raw).ok()
}
