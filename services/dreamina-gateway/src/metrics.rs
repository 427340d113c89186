//! Prometheus metrics exposition
//!
//! Metrics recorded by the gateway:
//!
//! - `draw_requests_total` (counter): label `outcome`
//! - `draw_request_duration_seconds` (histogram): label `outcome`
//!
//! The pool crate records `pool_credit_debited_total` and
//! `pool_accounts_loaded` through the same global recorder.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries for draw latency. Generation jobs take seconds to
/// minutes, so the range runs from 0.5s up to the default 300s timeout.
const DRAW_DURATION_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0, 180.0, 300.0,
];

/// In-process counters surfaced on `/health`.
#[derive(Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Draws currently being processed, logged if the drain times out
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("draw_request_duration_seconds".to_string()),
            DRAW_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Explicit buckets make `draw_request_duration_seconds` render as a
/// histogram with `_bucket` lines instead of the default summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished draw with its outcome label.
pub fn record_draw(outcome: &str, duration_secs: f64) {
    metrics::counter!("draw_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("draw_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
