//! Resource clients
//!
//! Thin typed wrappers over the capability service endpoints. Each client
//! is constructed from an endpoint URI, a shared HTTP client and a
//! token-provider callback and never holds a token itself: the callback is
//! re-invoked for every call.

pub mod directory;
pub mod files;
pub mod mail;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::provider::AccessToken;
use crate::error::{AgentError, AgentResult};

pub type TokenFuture = Pin<Box<dyn Future<Output = Option<AccessToken>> + Send>>;

/// Callback that mints a bearer token scoped to one resource id.
pub type TokenProvider = Arc<dyn Fn() -> TokenFuture + Send + Sync>;

pub(crate) fn build_http_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .expect("Failed to build HTTP client")
}

pub(crate) async fn bearer(token_provider: &TokenProvider) -> AgentResult<String> {
    (token_provider)()
        .await
        .map(|token| token.value)
        .ok_or_else(|| AgentError::AuthFailed("sign-in was cancelled".into()))
}
