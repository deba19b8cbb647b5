//! Prometheus metrics for request, trial and health-check tracking.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// HTTP requests counter metric name.
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";
/// Failure-injection trials counter metric name.
pub const METRIC_RANDOM_RESULT: &str = "random_result_total";
/// Health check evaluation latency metric name.
pub const METRIC_HEALTH_CHECK_DURATION: &str = "health_check_duration_ms";

/// Initialize all metric descriptions.
/// Descriptions go to whichever recorder is installed at call time, so call
/// this after [`install_prometheus`].
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_HEALTH_CHECK_DURATION,
        "Time to evaluate all health checkers in milliseconds"
    );

    describe_counter!(METRIC_HTTP_REQUESTS, "Total number of HTTP requests served");
    describe_counter!(
        METRIC_RANDOM_RESULT,
        "Total number of failure-injection trials by outcome"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder with its own scrape listener.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Record HTTP request latency and count.
pub fn record_http_request(start: Instant, route: &str, status: u16) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "route" => route.to_string()).record(latency_ms);
    counter!(
        METRIC_HTTP_REQUESTS,
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment the trial counter for the given outcome.
pub fn inc_random_result(outcome: &'static str) {
    counter!(METRIC_RANDOM_RESULT, "outcome" => outcome).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a health check round.
pub fn timer_health_check() -> LatencyTimer {
    LatencyTimer::new(METRIC_HEALTH_CHECK_DURATION)
}
