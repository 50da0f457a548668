//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by method, status
//! - `shield_rate_limit_total` (counter): checks by outcome, degraded
//! - `shield_cookies_rejected_total` (counter): forged or corrupted inbound cookies
//! - `shield_csrf_failures_total` (counter): refused requests by reason
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording is a no-op until an exporter is installed

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_request(method: &str, status: u16) {
    counter!(
        "shield_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_rate_limit(outcome: &'static str, degraded: bool) {
    counter!(
        "shield_rate_limit_total",
        "outcome" => outcome,
        "degraded" => if degraded { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_cookie_rejected() {
    counter!("shield_cookies_rejected_total").increment(1);
}

pub fn record_csrf_failure(reason: &'static str) {
    counter!("shield_csrf_failures_total", "reason" => reason).increment(1);
}
