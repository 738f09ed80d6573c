use std::collections::HashMap;
use std::future::Future;
use std::time::Instant;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::capability::CapabilityInfo;
use crate::clients::TokenProvider;
use crate::error::{AgentError, AgentResult};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

/// Boundary to the discovery service: maps the signed-in user to
/// per-capability endpoints and resource ids.
pub trait DiscoveryEndpoint: Send + Sync {
    fn discover_capabilities(
        &self,
    ) -> impl Future<Output = AgentResult<HashMap<String, CapabilityInfo>>> + Send;
}

/// REST client for the vendor discovery endpoint. Every call mints a bearer
/// token for the fixed discovery resource id through the callback.
pub struct DiscoveryClient {
    endpoint: String,
    http: Client,
    retry: RetrySettings,
    token_provider: TokenProvider,
}

impl DiscoveryClient {
    pub fn new(
        endpoint: &str,
        http: Client,
        retry: RetrySettings,
        token_provider: TokenProvider,
    ) -> Self {
        let endpoint = if endpoint.ends_with('/') {
            endpoint.to_owned()
        } else {
            format!("{endpoint}/")
        };
        Self {
            endpoint,
            http,
            retry,
            token_provider,
        }
    }

    async fn fetch_once(&self, url: &str, bearer: &str) -> AgentResult<DiscoveryResponse> {
        let response = self.http.get(url).bearer_auth(bearer).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::DiscoveryFailed(format!(
                "discovery request failed: {}",
                response.status()
            )));
        }
        let body: DiscoveryResponse = response.json().await?;
        Ok(body)
    }
}

impl DiscoveryEndpoint for DiscoveryClient {
    async fn discover_capabilities(&self) -> AgentResult<HashMap<String, CapabilityInfo>> {
        let metrics = get_metrics().await;

        let token = (self.token_provider)().await.ok_or_else(|| {
            AgentError::AuthFailed("sign-in for the discovery service was cancelled".into())
        })?;

        let url = format!("{}services", self.endpoint);
        debug!("running capability discovery against {url}");

        let start = Instant::now();
        let result = self
            .retry
            .run_with_retry(|| self.fetch_once(&url, &token.value))
            .await;

        let outcome = if result.is_ok() { OUTCOME_SUCCESS } else { OUTCOME_FAILURE };
        metrics.discovery_requests.with_label_values(&[outcome]).inc();
        metrics
            .discovery_duration
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        let body = result?;
        let mut capabilities = HashMap::with_capacity(body.value.len());
        for entry in body.value {
            capabilities.insert(
                entry.capability,
                CapabilityInfo {
                    service_resource_id: entry.service_resource_id,
                    service_endpoint_uri: entry.service_endpoint_uri,
                    service_api_version: entry.service_api_version,
                },
            );
        }
        info!("discovery returned {} capabilities", capabilities.len());
        Ok(capabilities)
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    value: Vec<DiscoveryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryEntry {
    capability: String,
    service_resource_id: String,
    service_endpoint_uri: String,
    #[serde(default)]
    service_api_version: String,
}
