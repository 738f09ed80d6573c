//! Service session
//!
//! Explicit, caller-owned replacement for ambient client singletons. The
//! session owns the token resolver, the discovery endpoint, the discovery
//! cache and the settings store, and memoizes the three resource clients.
//! Each memoized slot sits behind its own async mutex, so concurrent
//! callers cannot construct the same client twice.

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::provider::{AadProvider, IdentityProvider};
use crate::auth::resolver::TokenResolver;
use crate::auth::session::{keys, AuthSession};
use crate::cache::capability::{CapabilityInfo, ServiceCapability};
use crate::cache::discovery_cache::{DiscoveryCache, DiscoveryCacheRecord};
use crate::clients::directory::DirectoryClient;
use crate::clients::files::FilesClient;
use crate::clients::mail::MailClient;
use crate::clients::{build_http_client, TokenFuture, TokenProvider};
use crate::config::settings::ServiceConfig;
use crate::discovery::client::{DiscoveryClient, DiscoveryEndpoint};
use crate::error::{AgentError, AgentResult};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;
use crate::store::settings_store::SettingsStore;
use crate::utils::constants::{
    AAD_SERVICE_ENDPOINT, AAD_SERVICE_RESOURCE_ID, DEFAULT_HTTP_TIMEOUT_MS,
};

pub struct ServiceSession<P, D> {
    resolver: Arc<TokenResolver<P>>,
    discovery: Arc<D>,
    cache: DiscoveryCache,
    settings: Arc<SettingsStore>,
    http: Client,
    directory_client: Mutex<Option<Arc<DirectoryClient>>>,
    mail_client: Mutex<Option<Arc<MailClient>>>,
    files_client: Mutex<Option<Arc<FilesClient>>>,
}

/// Token-provider callback re-invoking the resolver for one resource id on
/// every call.
pub fn token_provider_for<P>(resolver: Arc<TokenResolver<P>>, resource_id: String) -> TokenProvider
where
    P: IdentityProvider + 'static,
{
    Arc::new(move || -> TokenFuture {
        let resolver = resolver.clone();
        let resource_id = resource_id.clone();
        Box::pin(async move { resolver.acquire_token(&resource_id).await })
    })
}

impl<P, D> ServiceSession<P, D>
where
    P: IdentityProvider + 'static,
    D: DiscoveryEndpoint,
{
    pub fn new(
        resolver: Arc<TokenResolver<P>>,
        discovery: Arc<D>,
        cache: DiscoveryCache,
        settings: Arc<SettingsStore>,
        http: Client,
    ) -> Self {
        Self {
            resolver,
            discovery,
            cache,
            settings,
            http,
            directory_client: Mutex::new(None),
            mail_client: Mutex::new(None),
            files_client: Mutex::new(None),
        }
    }

    pub fn auth_session(&self) -> AuthSession {
        AuthSession::new(self.settings.clone())
    }

    pub fn resolver(&self) -> &Arc<TokenResolver<P>> {
        &self.resolver
    }

    /// Discovery info for one capability: cached entry when it belongs to
    /// the current user, otherwise a full discovery run followed by a save.
    pub async fn capability_info(&self, capability: ServiceCapability) -> AgentResult<CapabilityInfo> {
        let current_user = self.auth_session().logged_in_user().await;
        if let Some(info) = self.cache.lookup(capability, &current_user).await {
            return Ok(info);
        }

        let record = self.refresh_discovery_cache().await?;
        record
            .capabilities
            .get(capability.as_str())
            .cloned()
            .ok_or_else(|| {
                AgentError::DiscoveryFailed(format!(
                    "capability '{capability}' not returned by discovery"
                ))
            })
    }

    /// Re-run discovery and replace the persisted record for the current
    /// user. Not atomic against concurrent refreshers; the last writer wins.
    pub async fn refresh_discovery_cache(&self) -> AgentResult<DiscoveryCacheRecord> {
        let capabilities = self.discovery.discover_capabilities().await?;
        let current_user = self.auth_session().logged_in_user().await;
        self.cache.create_and_save(&current_user, capabilities).await
    }

    pub async fn ensure_directory_client(&self) -> AgentResult<Arc<DirectoryClient>> {
        let mut slot = self.directory_client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        match self.build_directory_client().await {
            Ok(client) => {
                *slot = Some(client.clone());
                Ok(client)
            }
            Err(err) => {
                self.resolver.provider().clear_token_cache().await;
                Err(err)
            }
        }
    }

    pub async fn ensure_mail_client(&self) -> AgentResult<Arc<MailClient>> {
        let mut slot = self.mail_client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        match self.build_mail_client().await {
            Ok(client) => {
                *slot = Some(client.clone());
                Ok(client)
            }
            Err(err) => {
                self.resolver.provider().clear_token_cache().await;
                Err(err)
            }
        }
    }

    pub async fn ensure_files_client(&self) -> AgentResult<Arc<FilesClient>> {
        let mut slot = self.files_client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        match self.build_files_client().await {
            Ok(client) => {
                *slot = Some(client.clone());
                Ok(client)
            }
            Err(err) => {
                self.resolver.provider().clear_token_cache().await;
                Err(err)
            }
        }
    }

    /// Sign the current user out: provider logout, token cache cleared,
    /// every memoized client dropped, TenantId and LastAuthority removed.
    /// LoggedInUser is kept so the logout can be retried if it failed
    /// partway. No-op when nobody is signed in.
    pub async fn sign_out(&self) -> AgentResult<()> {
        let current_user = self.auth_session().logged_in_user().await;
        if current_user.is_empty() {
            return Ok(());
        }

        self.resolver.provider().logout(&current_user).await?;
        self.resolver.provider().clear_token_cache().await;

        *self.directory_client.lock().await = None;
        *self.mail_client.lock().await = None;
        *self.files_client.lock().await = None;

        self.settings.remove(keys::TENANT_ID).await?;
        self.settings.remove(keys::LAST_AUTHORITY).await?;

        info!("signed out '{current_user}'");
        Ok(())
    }

    async fn build_directory_client(&self) -> AgentResult<Arc<DirectoryClient>> {
        // token first: a successful acquisition pins the tenant we scope
        // the directory endpoint to
        self.resolver
            .acquire_token(AAD_SERVICE_RESOURCE_ID)
            .await
            .ok_or_else(|| AgentError::AuthFailed("sign-in was cancelled".into()))?;

        let tenant = self.auth_session().tenant_id().await;
        if tenant.is_empty() {
            warn!("no tenant id anchored after sign-in, using the token's tenant");
        }

        let provider =
            token_provider_for(self.resolver.clone(), AAD_SERVICE_RESOURCE_ID.to_owned());
        let client = Arc::new(DirectoryClient::new(
            AAD_SERVICE_ENDPOINT,
            &tenant,
            self.http.clone(),
            provider,
        ));

        get_metrics()
            .await
            .client_constructions
            .with_label_values(&["Directory"])
            .inc();
        Ok(client)
    }

    async fn build_mail_client(&self) -> AgentResult<Arc<MailClient>> {
        let info = self.capability_info(ServiceCapability::Mail).await?;
        let provider = token_provider_for(self.resolver.clone(), info.service_resource_id.clone());
        let client = Arc::new(MailClient::new(
            &info.service_endpoint_uri,
            self.http.clone(),
            provider,
        ));

        get_metrics()
            .await
            .client_constructions
            .with_label_values(&[ServiceCapability::Mail.as_str()])
            .inc();
        Ok(client)
    }

    async fn build_files_client(&self) -> AgentResult<Arc<FilesClient>> {
        let info = self.capability_info(ServiceCapability::MyFiles).await?;
        let provider = token_provider_for(self.resolver.clone(), info.service_resource_id.clone());
        let client = Arc::new(FilesClient::new(
            &info.service_endpoint_uri,
            self.http.clone(),
            provider,
        ));

        get_metrics()
            .await
            .client_constructions
            .with_label_values(&[ServiceCapability::MyFiles.as_str()])
            .inc();
        Ok(client)
    }
}

impl ServiceSession<AadProvider, DiscoveryClient> {
    /// Wire up the production session from config: settings store, AAD
    /// provider against the last-used authority, discovery client, cache.
    pub async fn from_config(cfg: &ServiceConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&cfg.storage.dir).await?;

        let http = build_http_client(
            cfg.settings.http_timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
        );

        let settings = Arc::new(SettingsStore::new(cfg.storage.settings_path()));
        let last_authority = AuthSession::new(settings.clone()).last_authority().await;
        let authority = cfg.auth.authority_for(&last_authority);

        let provider = Arc::new(AadProvider::new(
            &cfg.auth.client_id,
            authority,
            http.clone(),
            settings.clone(),
        ));
        let resolver = Arc::new(TokenResolver::new(provider, settings.clone()));

        let retry = cfg
            .settings
            .retry
            .as_ref()
            .map(|r| r.to_settings())
            .unwrap_or(RetrySettings {
                attempts: 3,
                base_delay_ms: 200,
                max_delay_ms: 2000,
            });
        let discovery_tokens =
            token_provider_for(resolver.clone(), cfg.discovery.resource_id.clone());
        let discovery = Arc::new(DiscoveryClient::new(
            &cfg.discovery.endpoint,
            http.clone(),
            retry,
            discovery_tokens,
        ));

        let cache = DiscoveryCache::new(cfg.storage.cache_path());

        Ok(Self::new(resolver, discovery, cache, settings, http))
    }
}
