use serde::Deserialize;
use std::path::PathBuf;

use crate::resilience::retry::RetrySettings;
use crate::utils::constants::{COMMON_TENANT, DISCOVERY_CACHE_FILE, SESSION_SETTINGS_FILE};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub auth: AuthConfig,
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// ================================
/// Identity provider (Azure AD)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Application (client) id registered with the directory
    pub client_id: String,
    /// Authority base, e.g. https://login.microsoftonline.com
    #[serde(default = "default_authority")]
    pub authority: String,
    /// Tenant segment appended to the authority until a sign-in pins a real one
    pub tenant: Option<String>,
}

impl AuthConfig {
    /// Authority for the next acquisition: the one used by the last
    /// successful sign-in when known, otherwise {authority}/{tenant}.
    pub fn authority_for(&self, last_authority: &str) -> String {
        if last_authority.is_empty() {
            format!(
                "{}/{}",
                self.authority.trim_end_matches('/'),
                self.tenant.as_deref().unwrap_or(COMMON_TENANT)
            )
        } else {
            last_authority.to_owned()
        }
    }
}

/// ================================
/// Discovery service
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Discovery REST endpoint, e.g. https://api.office.com/discovery/v1.0/me/
    #[serde(default = "default_discovery_endpoint")]
    pub endpoint: String,
    /// Resource id tokens for the discovery call are scoped to
    #[serde(default = "default_discovery_resource_id")]
    pub resource_id: String,
}

/// ================================
/// Local storage (cache + session anchor)
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
}

impl StorageConfig {
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.cache_file)
    }

    pub fn settings_path(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.settings_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            cache_file: default_cache_file(),
            settings_file: default_settings_file(),
        }
    }
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    pub http_timeout_ms: Option<u64>,
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    /// will be multiplied by 2 on every attempt until max_delay_ms
    pub base_delay_ms: Option<u64>,
    /// max delay for retrying
    /// invariant: >= base_delay_ms
    pub max_delay_ms: Option<u64>,
}

impl RetryConfig {
    pub fn to_settings(&self) -> RetrySettings {
        RetrySettings {
            attempts: self.attempts.unwrap_or(3),
            base_delay_ms: self.base_delay_ms.unwrap_or(200),
            max_delay_ms: self.max_delay_ms.unwrap_or(2000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: "9100".to_owned(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_discovery_endpoint() -> String {
    "https://api.office.com/discovery/v1.0/me/".to_string()
}

fn default_discovery_resource_id() -> String {
    "https://api.office.com/discovery/".to_string()
}

fn default_storage_dir() -> String {
    ".".to_string()
}

fn default_cache_file() -> String {
    DISCOVERY_CACHE_FILE.to_string()
}

fn default_settings_file() -> String {
    SESSION_SETTINGS_FILE.to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
