//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, tier
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_cache_hits_total` (counter): cache hits by category
//! - `proxy_cache_swept_total` (counter): entries removed by the sweep
//! - `proxy_upstream_errors_total` (counter): upstream failures by kind
//! - `proxy_capture_events_total` (counter): capture state transitions
//!
//! # Design Decisions
//! - Low-overhead updates (atomic operations behind the `metrics` macros)
//! - The Prometheus exporter is optional and config-gated

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, tier: &str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_hit(category: &str) {
    counter!("proxy_cache_hits_total", "category" => category.to_string()).increment(1);
}

pub fn record_cache_sweep(category: &str, removed: usize) {
    counter!("proxy_cache_swept_total", "category" => category.to_string())
        .increment(removed as u64);
}

pub fn record_upstream_error(kind: &str) {
    counter!("proxy_upstream_errors_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_capture_event(event: &str) {
    counter!("proxy_capture_events_total", "event" => event.to_string()).increment(1);
}
