//! Shared constants and invariants

pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

/// Fixed file names inside the storage directory
pub const DISCOVERY_CACHE_FILE: &str = "DiscoveryInfo.bin";
pub const SESSION_SETTINGS_FILE: &str = "session.json";

/// AAD directory graph is not discovered; its resource id and endpoint are fixed.
pub const AAD_SERVICE_RESOURCE_ID: &str = "https://graph.windows.net/";
pub const AAD_SERVICE_ENDPOINT: &str = "https://graph.windows.net/";
pub const AAD_GRAPH_API_VERSION: &str = "1.6";

/// Tenant segment used before the first sign-in pins a real tenant.
pub const COMMON_TENANT: &str = "Common";
