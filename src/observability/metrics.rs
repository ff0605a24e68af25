//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gitgate_requests_total` (counter): requests by route, status
//! - `gitgate_request_duration_seconds` (histogram): latency by route
//! - `gitgate_auth_total` (counter): verification outcomes by method
//! - `gitgate_rate_limited_total` (counter): denials by kind
//! - `gitgate_cache_total` (counter): hit/miss/store/error
//! - `gitgate_upstream_requests_total` (counter): release source calls by op, outcome
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("gitgate_requests_total", "route" => route, "status" => status.to_string()).increment(1);
    histogram!("gitgate_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_auth(method: &'static str, outcome: &'static str) {
    counter!("gitgate_auth_total", "method" => method, "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(kind: &'static str) {
    counter!("gitgate_rate_limited_total", "kind" => kind).increment(1);
}

pub fn record_cache(result: &'static str) {
    counter!("gitgate_cache_total", "result" => result).increment(1);
}

pub fn record_upstream(op: &'static str, outcome: &'static str) {
    counter!("gitgate_upstream_requests_total", "op" => op, "outcome" => outcome).increment(1);
}
