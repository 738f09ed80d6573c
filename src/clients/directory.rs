use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::clients::mail::check_status;
use crate::clients::{bearer, TokenProvider};
use crate::error::AgentResult;
use crate::utils::constants::AAD_GRAPH_API_VERSION;

/// Directory graph client. Unlike mail and files, the directory endpoint is
/// fixed and scoped by tenant rather than discovered.
pub struct DirectoryClient {
    base: String,
    tenant: String,
    http: Client,
    token_provider: TokenProvider,
}

impl DirectoryClient {
    pub fn new(
        endpoint_uri: &str,
        tenant_id: &str,
        http: Client,
        token_provider: TokenProvider,
    ) -> Self {
        let tenant = if tenant_id.is_empty() {
            // tenant not pinned yet; the graph accepts this alias for the
            // tenant of the presented token
            "myorganization".to_owned()
        } else {
            tenant_id.to_owned()
        };
        Self {
            base: endpoint_uri.trim_end_matches('/').to_owned(),
            tenant,
            http,
            token_provider,
        }
    }

    /// Directory object of the signed-in user.
    pub async fn me(&self) -> AgentResult<DirectoryUser> {
        let bearer = bearer(&self.token_provider).await?;

        let url = format!("{}/{}/me", self.base, self.tenant);
        let response = self
            .http
            .get(&url)
            .query(&[("api-version", AAD_GRAPH_API_VERSION)])
            .bearer_auth(&bearer)
            .send()
            .await?;
        let response = check_status(response, "directory me")?;

        Ok(response.json().await?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub object_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}
