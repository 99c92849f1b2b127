//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, status, backend
//! - `lb_request_duration_seconds` (histogram): end-to-end latency
//! - `lb_backend_alive` (gauge): 1=alive, 0=dead, per backend
//! - `lb_health_probes_total` (counter): probe outcomes per backend
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Label used when no backend was selected.
pub const NO_BACKEND: &str = "none";

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    ::metrics::counter!(
        "lb_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "lb_request_duration_seconds",
        "method" => method.to_string(),
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_probe(backend: &str, alive: bool) {
    let outcome = if alive { "success" } else { "failure" };
    ::metrics::counter!(
        "lb_health_probes_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    ::metrics::gauge!("lb_backend_alive", "backend" => backend.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}
