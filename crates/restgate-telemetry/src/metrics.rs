//! Prometheus metrics for Restgate.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `restgate_requests_total` | Counter | `status` | Requests that went through the pipeline |
//! | `restgate_request_duration_seconds` | Histogram | - | Pipeline latency |
//! | `restgate_aborts_total` | Counter | `reason` | Aborted requests by cause |
//! | `restgate_rate_limited_total` | Counter | `class` | Rate-limit rejections |
//! | `restgate_audit_failures_total` | Counter | `operation` | Audit store failures |
//! | `restgate_in_flight_requests` | Gauge | - | Requests currently in the pipeline |
//!
//! Recording without an installed recorder is a no-op.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Request counter.
pub const REQUESTS_TOTAL: &str = "restgate_requests_total";
/// Request latency histogram.
pub const REQUEST_DURATION: &str = "restgate_request_duration_seconds";
/// Abort counter.
pub const ABORTS_TOTAL: &str = "restgate_aborts_total";
/// Rate-limit rejection counter.
pub const RATE_LIMITED_TOTAL: &str = "restgate_rate_limited_total";
/// Audit failure counter.
pub const AUDIT_FAILURES_TOTAL: &str = "restgate_audit_failures_total";
/// In-flight gauge.
pub const IN_FLIGHT: &str = "restgate_in_flight_requests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address for the Prometheus scrape listener. `None` installs the
    /// recorder without a listener; use [`render_metrics`] instead.
    pub addr: Option<String>,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: None,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
        }
    }
}

/// Initializes the Prometheus recorder.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable listener
/// address and `TelemetryError::MetricsInit` if a recorder is already
/// installed or the buckets are invalid.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    if let Some(addr) = &config.addr {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
        builder = builder.with_http_listener(addr);
    }

    let handle = builder
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus text format, if a recorder is installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(REQUESTS_TOTAL, "Requests processed by the pipeline");
    describe_histogram!(REQUEST_DURATION, "Pipeline duration in seconds");
    describe_counter!(ABORTS_TOTAL, "Aborted requests by reason");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests rejected by the rate limiter");
    describe_counter!(AUDIT_FAILURES_TOTAL, "Audit store operations that failed");
    describe_gauge!(IN_FLIGHT, "Requests currently in the pipeline");
}

/// Records a finished request.
pub fn record_request(status_code: u16, duration: Duration) {
    counter!(REQUESTS_TOTAL, "status" => status_code.to_string()).increment(1);
    histogram!(REQUEST_DURATION).record(duration.as_secs_f64());
}

/// Records an abort by reason (`validation`, `rate_limited`, ...).
pub fn record_abort(reason: &'static str) {
    counter!(ABORTS_TOTAL, "reason" => reason).increment(1);
}

/// Records a rate-limit rejection.
pub fn record_rate_limited(class: &str) {
    counter!(RATE_LIMITED_TOTAL, "class" => class.to_string()).increment(1);
}

/// Records a failed audit store call (`open`, `merge`, `commit`, `count`).
pub fn record_audit_failure(operation: &'static str) {
    counter!(AUDIT_FAILURES_TOTAL, "operation" => operation).increment(1);
}

/// Keeps the in-flight gauge raised until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}
