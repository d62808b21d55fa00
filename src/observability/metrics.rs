//! Metrics collection and exposition.
//!
//! # Metrics
//! - `restgate_admissions_total` (counter): admission decisions by outcome
//! - `restgate_visitors` (gauge): tracked rate-limit keys
//! - `restgate_visitors_evicted_total` (counter): keys removed by the sweep
//! - `restgate_in_flight_requests` (gauge): requests currently being served
//! - `restgate_service_state` (gauge): lifecycle state as its numeric code
//!
//! All recorders are no-ops until a recorder is installed, so library code
//! and tests can call them freely.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one admission decision.
pub fn record_admission(outcome: &'static str) {
    counter!("restgate_admissions_total", "outcome" => outcome).increment(1);
}

pub fn record_visitors(count: usize) {
    gauge!("restgate_visitors").set(count as f64);
}

pub fn record_evictions(removed: usize) {
    counter!("restgate_visitors_evicted_total").increment(removed as u64);
}

pub fn record_in_flight(count: u64) {
    gauge!("restgate_in_flight_requests").set(count as f64);
}

pub fn record_service_state(code: u8) {
    gauge!("restgate_service_state").set(f64::from(code));
}
