//! Metrics collection and exposition.
//!
//! # Metrics
//! - `backend_request_outcomes_total` (counter): terminal outcomes by kind
//! - `backend_bytes_sent` (histogram): payload bytes handed to the connection
//! - `backend_request_duration_seconds` (histogram): request start to outcome
//! - `backend_active_connections` (gauge): current connection count
//! - `proxy_responses_total` (counter): proxied responses by status
//! - `proxy_upstream_aborts_total` (counter): mid-body aborts by reason
//! - `proxy_upstream_duration_seconds` (histogram): time to response head

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_outcome(kind: &'static str, bytes: u64, elapsed: Duration) {
    metrics::counter!("backend_request_outcomes_total", "outcome" => kind).increment(1);
    metrics::histogram!("backend_bytes_sent").record(bytes as f64);
    metrics::histogram!("backend_request_duration_seconds", "outcome" => kind)
        .record(elapsed.as_secs_f64());
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("backend_active_connections").set(count as f64);
}

pub fn record_proxy_response(status: u16, elapsed: Duration) {
    metrics::counter!("proxy_responses_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("proxy_upstream_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_upstream_abort(reason: &'static str) {
    metrics::counter!("proxy_upstream_aborts_total", "reason" => reason).increment(1);
}
