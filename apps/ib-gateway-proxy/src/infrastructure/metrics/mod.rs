//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Operations**: Counts and latency of gateway operations by outcome
//! - **Heartbeat**: Probe failures and recovery connects
//! - **Connection**: Strict gateway connection state
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::GatewayError;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was installed outside this function.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ib_proxy_operations_total",
        "Gateway operations by operation and outcome"
    );
    describe_histogram!(
        "ib_proxy_operation_seconds",
        "Caller-observed gateway operation latency"
    );
    describe_counter!(
        "ib_proxy_heartbeat_failures_total",
        "Heartbeat probes that failed or timed out"
    );
    describe_counter!(
        "ib_proxy_reconnects_total",
        "Recovery connects started by the heartbeat monitor"
    );
    describe_gauge!(
        "ib_proxy_gateway_connected",
        "1 when the gateway session is connected and heartbeat-verified"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for an operation result.
#[must_use]
pub const fn outcome_label<T>(result: &Result<T, GatewayError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

/// Record one gateway operation.
pub fn record_operation(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "ib_proxy_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("ib_proxy_operation_seconds", "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record a failed or timed-out heartbeat probe.
pub fn record_heartbeat_failure() {
    counter!("ib_proxy_heartbeat_failures_total").increment(1);
}

/// Record a recovery connect attempt.
pub fn record_reconnect() {
    counter!("ib_proxy_reconnects_total").increment(1);
}

/// Update the strict connection gauge.
pub fn set_gateway_connected(connected: bool) {
    gauge!("ib_proxy_gateway_connected").set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
