use crate::config::settings::{LogFormat, LoggingConfig, ServiceConfig};
use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

/// Load and validate config from YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
    let raw = fs::read_to_string(path)?;
    let mut config: ServiceConfig = serde_yaml::from_str(&raw)?;

    // Apply defaults
    if config.settings.logging.is_none() {
        config.settings.logging = Some(LoggingConfig {
            level: "info".into(),
            format: LogFormat::Compact,
        });
    }

    // Validate auth
    if config.auth.client_id.trim().is_empty() {
        bail!("auth.client_id must not be empty");
    }
    if !config.auth.authority.starts_with("http") {
        bail!("auth.authority must be an absolute URL: '{}'", config.auth.authority);
    }

    // Validate discovery
    if !config.discovery.endpoint.starts_with("http") {
        bail!(
            "discovery.endpoint must be an absolute URL: '{}'",
            config.discovery.endpoint
        );
    }
    if config.discovery.resource_id.trim().is_empty() {
        bail!("discovery.resource_id must not be empty");
    }

    Ok(config)
}
