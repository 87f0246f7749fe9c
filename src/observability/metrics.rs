//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): time to upstream response head
//! - `proxy_connect_failures_total` (counter): CONNECT dials that failed
//! - `proxy_tunnels_active` (gauge): CONNECT tunnels currently relaying
//! - `proxy_tunnel_bytes_total` (counter): tunneled bytes by direction
//! - `proxy_attribution_total` (counter): attribution lookups by outcome
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when the exporter is disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_connect_failure() {
    counter!("proxy_connect_failures_total").increment(1);
}

pub fn tunnel_opened() {
    gauge!("proxy_tunnels_active").increment(1.0);
}

pub fn tunnel_closed(client_to_upstream: u64, upstream_to_client: u64) {
    gauge!("proxy_tunnels_active").decrement(1.0);
    counter!("proxy_tunnel_bytes_total", "direction" => "upstream").increment(client_to_upstream);
    counter!("proxy_tunnel_bytes_total", "direction" => "downstream").increment(upstream_to_client);
}

pub fn record_attribution(outcome: &'static str) {
    counter!("proxy_attribution_total", "outcome" => outcome).increment(1);
}
