use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{extract::State, response::IntoResponse, Router};
use http::{header::CONTENT_TYPE, StatusCode};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::settings::{MetricsConfig, ServerConfig};
use crate::observability::metrics::get_metrics;

#[derive(Clone)]
pub struct MetricsState {
    pub registry: Arc<Registry>,
}

impl MetricsState {
    pub fn new(registry: Registry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn router(&self, metrics_config: &MetricsConfig) -> Router {
        let mut router = Router::new();
        if metrics_config.is_enabled {
            router = router.route(metrics_config.path.as_str(), get(render_metrics));
        }
        router.with_state(self.clone())
    }
}

async fn render_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, [(CONTENT_TYPE, "text/plain")], String::new());
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
}

/// Serve the metrics route until `shutdown` fires. Returns at once when metrics are disabled.
pub async fn serve(
    server: &ServerConfig,
    metrics_config: &MetricsConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let metrics = get_metrics().await;
    let app = MetricsState::new(metrics.registry.clone()).router(metrics_config);
    if !app.has_routes() {
        return Ok(());
    }

    let address = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind metrics listener on {}", address))?;
    info!(address = %address, path = %metrics_config.path, "metrics endpoint listening");
    metrics.up.set(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("metrics server failed")?;
    Ok(())
}
