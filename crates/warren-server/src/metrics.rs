//! Metrics collection and export for Warren.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "warren_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "warren_connections_active";
    pub const FRAMES_TOTAL: &str = "warren_frames_total";
    pub const FRAMES_BYTES: &str = "warren_frames_bytes";
    pub const CHANNELS_ACTIVE: &str = "warren_channels_active";
    pub const VIOLATIONS_TOTAL: &str = "warren_protocol_violations_total";
    pub const DISPATCH_SECONDS: &str = "warren_dispatch_seconds";
    pub const ERRORS_TOTAL: &str = "warren_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames by direction");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total frame bytes by direction");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of open channels");
    metrics::describe_counter!(
        names::VIOLATIONS_TOTAL,
        "Protocol violations closed back to peers, by reply code"
    );
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Method dispatch latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record dispatch latency.
pub fn record_dispatch(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Adjust the open channel gauge by `delta`.
pub fn adjust_channels(delta: i64) {
    if delta > 0 {
        gauge!(names::CHANNELS_ACTIVE).increment(delta as f64);
    } else if delta < 0 {
        gauge!(names::CHANNELS_ACTIVE).decrement(delta.unsigned_abs() as f64);
    }
}

/// Record a protocol violation by reply code.
pub fn record_violation(reply_code: u16) {
    counter!(names::VIOLATIONS_TOTAL, "code" => reply_code.to_string()).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
