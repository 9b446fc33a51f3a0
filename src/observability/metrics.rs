use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the process wide `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

const LATENCY_BUCKETS: [f64; 10] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0];

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Bounded executor
    pub upstream_requests: IntCounterVec,
    pub upstream_failures: IntCounterVec,
    pub upstream_duration: HistogramVec,
    pub upstream_time_to_token: HistogramVec,
    pub upstream_time_to_first_byte: HistogramVec,

    // Token lifecycle
    pub token_refreshes: IntCounterVec,
    pub token_expiry_unix: IntGauge,

    // Cache
    pub cache_lookups: IntCounterVec,
    pub cache_evictions: IntCounter,

    // Generation
    pub generation_results: IntCounterVec,
    pub generation_dropped_items: IntCounter,

    // Access tokens
    pub access_tokens_issued: IntCounter,
    pub access_token_validations: IntCounterVec,
    pub access_tokens_active: IntGauge,

    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("gateway".into()), None)
            .expect("static registry prefix");

        let metrics: Arc<Metrics> = Arc::new(Self {
            upstream_requests: IntCounterVec::new(Opts::new("upstream_requests_total", "Outbound calls by endpoint"), &["endpoint", "method"]).expect("metric"),
            upstream_failures: IntCounterVec::new(Opts::new("upstream_failures_total", "Outbound failures by reason"), &["endpoint", "reason"]).expect("metric"),
            upstream_duration: HistogramVec::new(HistogramOpts::new("upstream_duration_seconds", "Total outbound call latency").buckets(LATENCY_BUCKETS.to_vec()), &["endpoint"]).expect("metric"),
            upstream_time_to_token: HistogramVec::new(HistogramOpts::new("upstream_time_to_token_seconds", "Time spent obtaining a bearer token").buckets(LATENCY_BUCKETS.to_vec()), &["endpoint"]).expect("metric"),
            upstream_time_to_first_byte: HistogramVec::new(HistogramOpts::new("upstream_time_to_first_byte_seconds", "Time until response headers arrived").buckets(LATENCY_BUCKETS.to_vec()), &["endpoint"]).expect("metric"),

            token_refreshes: IntCounterVec::new(Opts::new("token_refreshes_total", "Bearer token refresh attempts"), &["outcome"]).expect("metric"),
            token_expiry_unix: IntGauge::new("token_expiry_unix_seconds", "Current access token expiry").expect("metric"),

            cache_lookups: IntCounterVec::new(Opts::new("cache_lookups_total", "TTL cache lookups"), &["cache", "result"]).expect("metric"),
            cache_evictions: IntCounter::new("cache_evictions_total", "Expired cache entries evicted").expect("metric"),

            generation_results: IntCounterVec::new(Opts::new("generation_results_total", "Structured generation outcomes"), &["outcome"]).expect("metric"),
            generation_dropped_items: IntCounter::new("generation_dropped_items_total", "Generated items rejected by validation").expect("metric"),

            access_tokens_issued: IntCounter::new("access_tokens_issued_total", "Resource access tokens issued").expect("metric"),
            access_token_validations: IntCounterVec::new(Opts::new("access_token_validations_total", "Resource access token checks"), &["result"]).expect("metric"),
            access_tokens_active: IntGauge::new("access_tokens_active", "Resource access tokens held in memory").expect("metric"),

            up: IntGauge::new("up", "1 if service is healthy").expect("metric"),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.upstream_requests.clone()),
            Box::new(metrics.upstream_failures.clone()),
            Box::new(metrics.upstream_duration.clone()),
            Box::new(metrics.upstream_time_to_token.clone()),
            Box::new(metrics.upstream_time_to_first_byte.clone()),
            Box::new(metrics.token_refreshes.clone()),
            Box::new(metrics.token_expiry_unix.clone()),
            Box::new(metrics.cache_lookups.clone()),
            Box::new(metrics.cache_evictions.clone()),
            Box::new(metrics.generation_results.clone()),
            Box::new(metrics.generation_dropped_items.clone()),
            Box::new(metrics.access_tokens_issued.clone()),
            Box::new(metrics.access_token_validations.clone()),
            Box::new(metrics.access_tokens_active.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            reg.register(collector).expect("unique metric names");
        }

        metrics
    }
}
