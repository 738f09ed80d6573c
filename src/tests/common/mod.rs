// src/tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::auth::provider::{AccessToken, AcquireOutcome, Identity, IdentityProvider};
use crate::auth::resolver::TokenResolver;
use crate::cache::capability::CapabilityInfo;
use crate::cache::discovery_cache::DiscoveryCache;
use crate::clients::build_http_client;
use crate::discovery::client::DiscoveryEndpoint;
use crate::error::{AgentError, AgentResult};
use crate::session::ServiceSession;
use crate::store::settings_store::SettingsStore;
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;
use crate::utils::time::now_i64;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    Succeed,
    Cancel,
    Fail,
}

/// In-memory identity provider with call counters.
pub struct FakeProvider {
    pub user_id: String,
    pub tenant_id: String,
    pub mode: FakeMode,
    pub acquire_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub cache_clears: AtomicUsize,
}

impl FakeProvider {
    pub fn succeeding(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
            tenant_id: "tenant-1".to_owned(),
            mode: FakeMode::Succeed,
            acquire_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            cache_clears: AtomicUsize::new(0),
        }
    }

    pub fn cancelling() -> Self {
        Self {
            mode: FakeMode::Cancel,
            ..Self::succeeding("nobody")
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: FakeMode::Fail,
            ..Self::succeeding("nobody")
        }
    }
}

impl IdentityProvider for FakeProvider {
    async fn acquire(&self, resource_id: &str) -> AgentResult<AcquireOutcome> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FakeMode::Succeed => Ok(AcquireOutcome::Success {
                token: AccessToken {
                    value: format!("tok-{resource_id}"),
                    expires_at: now_i64() + 3600,
                },
                identity: Identity {
                    user_id: self.user_id.clone(),
                    tenant_id: self.tenant_id.clone(),
                    authority: "https://login.test/Common".to_owned(),
                },
            }),
            FakeMode::Cancel => Ok(AcquireOutcome::Cancelled),
            FakeMode::Fail => Err(AgentError::AuthFailed("bad credentials".into())),
        }
    }

    async fn logout(&self, _user_id: &str) -> AgentResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_token_cache(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Discovery endpoint returning a fixed capability map, with a call counter.
pub struct FakeDiscovery {
    pub calls: AtomicUsize,
    pub capabilities: HashMap<String, CapabilityInfo>,
}

impl FakeDiscovery {
    pub fn with_defaults() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            capabilities: sample_capabilities(),
        }
    }
}

impl DiscoveryEndpoint for FakeDiscovery {
    async fn discover_capabilities(&self) -> AgentResult<HashMap<String, CapabilityInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.capabilities.clone())
    }
}

pub fn sample_capabilities() -> HashMap<String, CapabilityInfo> {
    let mut map = HashMap::new();
    map.insert(
        "Mail".to_owned(),
        CapabilityInfo::new(
            "https://outlook.office365.com/",
            "https://outlook.office365.com/api/v1.0",
            "v1.0",
        ),
    );
    map.insert(
        "MyFiles".to_owned(),
        CapabilityInfo::new(
            "https://contoso-my.sharepoint.com/",
            "https://contoso-my.sharepoint.com/_api/v1.0/me",
            "v1.0",
        ),
    );
    map
}

/// Wire a session over fakes inside `dir`.
pub fn build_session(
    dir: &Path,
    provider: Arc<FakeProvider>,
    discovery: Arc<FakeDiscovery>,
) -> ServiceSession<FakeProvider, FakeDiscovery> {
    let settings = Arc::new(SettingsStore::new(dir.join("session.json")));
    let resolver = Arc::new(TokenResolver::new(provider, settings.clone()));
    let cache = DiscoveryCache::new(dir.join("DiscoveryInfo.bin"));
    let http = build_http_client(DEFAULT_HTTP_TIMEOUT_MS);
    ServiceSession::new(resolver, discovery, cache, settings, http)
}
