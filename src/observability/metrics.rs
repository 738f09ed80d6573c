use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the static `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Token resolution
    pub token_acquisitions: IntCounterVec,

    // Discovery service
    pub discovery_requests: IntCounterVec,
    pub discovery_duration: HistogramVec,

    // Discovery cache
    pub cache_lookups: IntCounterVec,

    // Session clients
    pub client_constructions: IntCounterVec,

    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("discoveryagent".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            token_acquisitions: IntCounterVec::new(Opts::new("token_acquisitions_total", "Token acquisition attempts by outcome"), &["outcome"]).unwrap(),
            discovery_requests: IntCounterVec::new(Opts::new("discovery_requests_total", "Discovery service calls by outcome"), &["outcome"]).unwrap(),
            discovery_duration: HistogramVec::new(HistogramOpts::new("discovery_duration_seconds", "Discovery call duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]), &["outcome"]).unwrap(),
            cache_lookups: IntCounterVec::new(Opts::new("cache_lookups_total", "Discovery cache lookups by result"), &["result"]).unwrap(),
            client_constructions: IntCounterVec::new(Opts::new("client_constructions_total", "Resource client constructions by capability"), &["capability"]).unwrap(),
            up: IntGauge::new("up", "1 if service is healthy").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.token_acquisitions.clone())).unwrap();
        reg.register(Box::new(metrics.discovery_requests.clone())).unwrap();
        reg.register(Box::new(metrics.discovery_duration.clone())).unwrap();
        reg.register(Box::new(metrics.cache_lookups.clone())).unwrap();
        reg.register(Box::new(metrics.client_constructions.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
