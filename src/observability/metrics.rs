//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wro_requests_total` (counter): requests by dispatch kind
//! - `wro_request_duration_seconds` (histogram): latency by dispatch kind
//! - `wro_fallbacks_total` (counter): pass-throughs by reason
//! - `wro_header_recomputations_total` (counter)
//! - `wro_active_contexts` (gauge): request contexts currently open

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(kind: &'static str, status: u16, start: Instant) {
    metrics::counter!("wro_requests_total", "kind" => kind, "status" => status.to_string()).increment(1);
    metrics::histogram!("wro_request_duration_seconds", "kind" => kind).record(start.elapsed().as_secs_f64());
}

pub fn record_fallback(reason: &'static str) {
    metrics::counter!("wro_fallbacks_total", "reason" => reason).increment(1);
}

pub fn record_header_recomputation() {
    metrics::counter!("wro_header_recomputations_total").increment(1);
}

pub fn record_active_contexts(count: usize) {
    metrics::gauge!("wro_active_contexts").set(count as f64);
}
