use std::time::Duration;

use tracing::debug;

use crate::error::ExecutorError;
use crate::observability::metrics::get_metrics;

/// Timing of one outbound call. Informational only.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallTimings {
    pub total: Duration,
    pub time_to_token: Duration,
    pub time_to_first_byte: Option<Duration>,
}

pub async fn record_attempt(label: &str, method: &str) {
    get_metrics()
        .await
        .upstream_requests
        .with_label_values(&[label, method])
        .inc();
}

pub async fn record_outcome(label: &str, timings: &CallTimings, outcome: Result<u16, &ExecutorError>) {
    let metrics = get_metrics().await;
    metrics
        .upstream_duration
        .with_label_values(&[label])
        .observe(timings.total.as_secs_f64());
    metrics
        .upstream_time_to_token
        .with_label_values(&[label])
        .observe(timings.time_to_token.as_secs_f64());
    if let Some(ttfb) = timings.time_to_first_byte {
        metrics
            .upstream_time_to_first_byte
            .with_label_values(&[label])
            .observe(ttfb.as_secs_f64());
    }

    match outcome {
        Ok(status) => debug!(
            endpoint = label,
            status,
            total_ms = timings.total.as_millis() as u64,
            token_ms = timings.time_to_token.as_millis() as u64,
            ttfb_ms = timings.time_to_first_byte.map(|d| d.as_millis() as u64),
            "upstream call completed"
        ),
        Err(e) => {
            metrics
                .upstream_failures
                .with_label_values(&[label, e.reason()])
                .inc();
            debug!(
                endpoint = label,
                reason = e.reason(),
                total_ms = timings.total.as_millis() as u64,
                "upstream call failed"
            );
        }
    }
}
