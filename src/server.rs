use anyhow::Result;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;

/// Start the observability server when metrics are enabled. Blocks for the
/// lifetime of the listener.
pub async fn start(settings_config: &SettingsConfig) -> Result<()> {
    if !settings_config.metrics.is_enabled {
        info!("metrics endpoint disabled, nothing to serve");
        return Ok(());
    }

    let metrics = get_metrics().await;
    let state = MetricsState::new(metrics.registry.clone());
    let app = state.router(&settings_config.metrics);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    info!("serving metrics on {}:{}{}", bind_addr, port, settings_config.metrics.path);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port)).await?;
    metrics.up.set(1);
    axum::serve(listener, app).await?;

    Ok(())
}
