use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::clients::mail::check_status;
use crate::clients::{bearer, TokenProvider};
use crate::error::AgentResult;

/// SharePoint "MyFiles" client bound to the endpoint the MyFiles capability
/// resolved to.
pub struct FilesClient {
    base: String,
    http: Client,
    token_provider: TokenProvider,
}

impl FilesClient {
    pub fn new(endpoint_uri: &str, http: Client, token_provider: TokenProvider) -> Self {
        Self {
            base: endpoint_uri.trim_end_matches('/').to_owned(),
            http,
            token_provider,
        }
    }

    pub async fn list_files(&self) -> AgentResult<Vec<FileItem>> {
        let bearer = bearer(&self.token_provider).await?;

        let url = format!("{}/Files", self.base);
        let response = self.http.get(&url).bearer_auth(&bearer).send().await?;
        let response = check_status(response, "list files")?;

        let page: FilePage = response.json().await?;
        Ok(page.value)
    }
}

#[derive(Debug, Deserialize)]
struct FilePage {
    value: Vec<FileItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub time_last_modified: Option<DateTime<Utc>>,
}
