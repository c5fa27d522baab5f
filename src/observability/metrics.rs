//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): completed requests by route, status class
//! - `relay_duration_ms` (histogram): request duration by route
//! - `relay_errors_total` (counter): failures by route, error type
//! - `relay_storage_write_ms` (histogram): audit persistence latency
//! - `relay_rejections_total` (counter): admissions refused by reason
//! - `relay_active_streams` (gauge): requests in flight through the relay engine
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder every
//!   call is a no-op, which keeps tests free of global state
//! - The Prometheus exporter renders on the gateway's own listener

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::ErrorKind;

const DURATION_BUCKETS_MS: &[f64] = &[
    100.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0, 60000.0,
];
const STORAGE_BUCKETS_MS: &[f64] = &[1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0];

/// Install the Prometheus recorder globally and return the render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("relay_duration_ms".to_string()),
            DURATION_BUCKETS_MS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("relay_storage_write_ms".to_string()),
            STORAGE_BUCKETS_MS,
        )?
        .install_recorder()
}

/// `2xx`, `4xx`, ... for a status code.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

/// Record a completed request.
pub fn record_request(route: &str, status: u16, duration: Duration) {
    counter!(
        "relay_requests_total",
        "route" => route.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
    histogram!("relay_duration_ms", "route" => route.to_string())
        .record(duration.as_secs_f64() * 1000.0);
}

/// Record a classified request failure.
pub fn record_error(route: &str, kind: ErrorKind) {
    counter!(
        "relay_errors_total",
        "route" => route.to_string(),
        "type" => kind.as_str()
    )
    .increment(1);
}

/// Record an admission refused before relaying.
pub fn record_rejection(kind: ErrorKind) {
    counter!("relay_rejections_total", "reason" => kind.as_str()).increment(1);
}

/// Record how long an audit write took.
pub fn record_storage_write(duration: Duration) {
    histogram!("relay_storage_write_ms").record(duration.as_secs_f64() * 1000.0);
}

/// Record a failed audit write.
pub fn record_storage_error() {
    counter!(
        "relay_errors_total",
        "route" => "storage",
        "type" => "write_failed"
    )
    .increment(1);
}

/// Set the number of in-flight relayed requests.
pub fn record_active_streams(count: u64) {
    gauge!("relay_active_streams").set(count as f64);
}
