//! Metrics collection and exposition.
//!
//! # Metrics
//! - `reflector_reload_attempts_total` (counter): config pushes by service
//! - `reflector_reload_failures_total` (counter): reloads that exhausted their budget
//! - `reflector_process_up` (gauge): 1=running, 0=stopped, by service
//! - `reflector_inbounds_active` (gauge): inbounds activated by the last apply
//! - `reflector_inbounds_skipped_total` (counter): skipped inbounds by reason
//! - `reflector_camo_fetches_total` (counter): camo fetches by result

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "metrics exporter listening");
    Ok(())
}

pub fn record_reload_attempt(service: &'static str) {
    ::metrics::counter!("reflector_reload_attempts_total", "service" => service).increment(1);
}

pub fn record_reload_failure(service: &'static str) {
    ::metrics::counter!("reflector_reload_failures_total", "service" => service).increment(1);
}

pub fn set_process_up(service: &'static str, up: bool) {
    ::metrics::gauge!("reflector_process_up", "service" => service).set(if up { 1.0 } else { 0.0 });
}

pub fn set_inbounds_active(count: usize) {
    ::metrics::gauge!("reflector_inbounds_active").set(count as f64);
}

pub fn record_inbound_skipped(reason: &'static str) {
    ::metrics::counter!("reflector_inbounds_skipped_total", "reason" => reason).increment(1);
}

pub fn record_camo_fetch(result: &'static str) {
    ::metrics::counter!("reflector_camo_fetches_total", "result" => result).increment(1);
}
