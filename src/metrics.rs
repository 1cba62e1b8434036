//! Prometheus metrics for application observability.
//!
//! Metrics are exposed by a dedicated HTTP listener on `metricsPort` when the
//! port is non-zero. The exporter is installed once per process and survives
//! restarts.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `api_auth_rejections_total` - Requests rejected by auth (label: reason)
//! - `api_ip_rejections_total` - Requests rejected by the IP filter
//! - `api_lifecycle_transitions_total` - Handled lifecycle signals (label: signal)
//! - `api_drain_timeouts_total` - Graceful drains that hit the deadline
//!
//! ## Gauges
//! - `api_run_generation` - Number of the current run (1 = first start)

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_REJECTIONS_TOTAL: &str = "api_auth_rejections_total";
    pub const IP_REJECTIONS_TOTAL: &str = "api_ip_rejections_total";
    pub const LIFECYCLE_TRANSITIONS_TOTAL: &str = "api_lifecycle_transitions_total";
    pub const DRAIN_TIMEOUTS_TOTAL: &str = "api_drain_timeouts_total";
    pub const RUN_GENERATION: &str = "api_run_generation";
}

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Initialize the Prometheus metrics exporter.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::AUTH_REJECTIONS_TOTAL,
        "Total number of requests rejected by authentication"
    );
    describe_counter!(
        names::IP_REJECTIONS_TOTAL,
        "Total number of requests rejected by the IP filter"
    );
    describe_counter!(
        names::LIFECYCLE_TRANSITIONS_TOTAL,
        "Total number of handled lifecycle signals"
    );
    describe_counter!(
        names::DRAIN_TIMEOUTS_TOTAL,
        "Total number of graceful drains that exceeded the deadline"
    );
    describe_gauge!(names::RUN_GENERATION, "Current run generation");

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
///
/// Only the first call per process installs the exporter; later calls (after a
/// restart) are no-ops.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if INSTALLED.get().is_some() {
        return;
    }
    match init_metrics(metrics_addr) {
        Ok(()) => {
            let _ = INSTALLED.set(metrics_addr);
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize metrics, continuing without metrics");
        }
    }
}

/// Record an authentication rejection.
pub fn record_auth_rejection(reason: &'static str) {
    counter!(names::AUTH_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record an IP filter rejection.
pub fn record_ip_rejection() {
    counter!(names::IP_REJECTIONS_TOTAL).increment(1);
}

/// Record a handled lifecycle signal.
pub fn record_lifecycle_transition(signal: &'static str) {
    counter!(names::LIFECYCLE_TRANSITIONS_TOTAL, "signal" => signal).increment(1);
}

/// Record a drain that hit its deadline.
pub fn record_drain_timeout() {
    counter!(names::DRAIN_TIMEOUTS_TOTAL).increment(1);
}

/// Update the run generation gauge.
pub fn set_run_generation(generation: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(names::RUN_GENERATION).set(generation as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder is a no-op and must not panic.

    #[test]
    fn test_record_rejections() {
        record_auth_rejection("missing_credentials");
        record_ip_rejection();
    }

    #[test]
    fn test_record_lifecycle() {
        record_lifecycle_transition("restart");
        record_drain_timeout();
        set_run_generation(2);
    }
}
