use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::clients::{bearer, TokenProvider};
use crate::error::{AgentError, AgentResult};

/// Outlook mail client bound to the endpoint the Mail capability resolved to.
pub struct MailClient {
    base: String,
    http: Client,
    token_provider: TokenProvider,
}

impl MailClient {
    pub fn new(endpoint_uri: &str, http: Client, token_provider: TokenProvider) -> Self {
        Self {
            base: endpoint_uri.trim_end_matches('/').to_owned(),
            http,
            token_provider,
        }
    }

    /// One page of inbox messages, newest first. Pages start at 1.
    pub async fn list_messages(
        &self,
        page_no: usize,
        page_size: usize,
    ) -> AgentResult<Vec<MailMessage>> {
        if page_no == 0 {
            return Err(AgentError::InvalidArgument("page_no starts at 1".into()));
        }
        let bearer = bearer(&self.token_provider).await?;

        let skip = ((page_no - 1) * page_size).to_string();
        let top = page_size.to_string();
        let url = format!("{}/Me/Messages", self.base);
        debug!("listing messages page {page_no} (page size {page_size})");

        let response = self
            .http
            .get(&url)
            .query(&[
                ("$orderby", "DateTimeReceived desc"),
                ("$select", "Id,Subject,Sender,DateTimeReceived,BodyPreview,IsRead"),
                ("$skip", skip.as_str()),
                ("$top", top.as_str()),
            ])
            .bearer_auth(&bearer)
            .send()
            .await?;
        let response = check_status(response, "list messages")?;

        let page: MessagePage = response.json().await?;
        Ok(page.value)
    }

    pub async fn send_message(
        &self,
        subject: &str,
        body_text: &str,
        recipients: &[String],
    ) -> AgentResult<()> {
        if recipients.is_empty() {
            return Err(AgentError::InvalidArgument(
                "at least one recipient is required".into(),
            ));
        }
        let bearer = bearer(&self.token_provider).await?;

        let to: Vec<_> = recipients
            .iter()
            .map(|address| json!({"EmailAddress": {"Address": address}}))
            .collect();
        let payload = json!({
            "Message": {
                "Subject": subject,
                "Body": {"ContentType": "Text", "Content": body_text},
                "ToRecipients": to,
            },
            "SaveToSentItems": true,
        });

        let url = format!("{}/Me/SendMail", self.base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&bearer)
            .json(&payload)
            .send()
            .await?;
        check_status(response, "send message")?;
        Ok(())
    }

    pub async fn delete_message(&self, message_id: &str) -> AgentResult<()> {
        if message_id.is_empty() {
            return Err(AgentError::InvalidArgument(
                "message id must not be empty".into(),
            ));
        }
        let bearer = bearer(&self.token_provider).await?;

        let url = format!("{}/Me/Messages('{}')", self.base, message_id);
        let response = self.http.delete(&url).bearer_auth(&bearer).send().await?;
        check_status(response, "delete message")?;
        Ok(())
    }
}

pub(crate) fn check_status(
    response: reqwest::Response,
    action: &str,
) -> AgentResult<reqwest::Response> {
    if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
        return Err(AgentError::AuthFailed(format!(
            "{action} rejected: {}",
            response.status()
        )));
    }
    Ok(response.error_for_status()?)
}

#[derive(Debug, Deserialize)]
struct MessagePage {
    value: Vec<MailMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MailMessage {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body_preview: Option<String>,
    #[serde(default)]
    pub date_time_received: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub sender: Option<Recipient>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(rename = "EmailAddress")]
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
}
