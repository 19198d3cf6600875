//! Request and backend metrics
//!
//! Recorded through the `metrics` facade; they go nowhere unless a recorder
//! (the Prometheus exporter in `relay-server`) is installed.

use std::time::Duration;

/// Record a finished HTTP request
pub fn record_request(endpoint: &str, status: u16, duration: Duration) {
    metrics::counter!(
        "relay_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "relay_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record one backend search call
pub fn record_backend_call(endpoint: &str, success: bool, duration: Duration) {
    let outcome = if success { "ok" } else { "error" };

    metrics::histogram!(
        "relay_backend_duration_seconds",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome,
    )
    .record(duration.as_secs_f64());
}
