//! Metric names, registration, and the Prometheus exposition recorder.
//!
//! Metric emission goes through the `metrics` facade at the call sites;
//! this module pins the names and label sets in one place and installs
//! the recorder with the contractual histogram buckets.

use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// `requests_total{status, endpoint}`
pub const REQUESTS_TOTAL: &str = "requests_total";

/// `pii_detections_total{entity_type}`
pub const PII_DETECTIONS_TOTAL: &str = "pii_detections_total";

/// `injection_detections_total{pattern_type, action}`
pub const INJECTION_DETECTIONS_TOTAL: &str = "injection_detections_total";

/// `request_duration_seconds{endpoint}`
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";

/// `filter_duration_seconds{filter_name}`
pub const FILTER_DURATION_SECONDS: &str = "filter_duration_seconds";

/// Request-latency buckets, 10 ms to 10 s.
const REQUEST_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Filter-latency buckets, 1 ms to 250 ms.
const FILTER_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25];

/// Install the Prometheus recorder and describe every metric.
///
/// Returns the handle used to render exposition text.  Call once at
/// startup, before any request is served.
///
/// # Errors
///
/// Returns [`BuildError`] if the recorder cannot be installed (e.g. a
/// recorder is already registered in this process).
pub fn install(version: &str) -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
            REQUEST_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(FILTER_DURATION_SECONDS.to_string()),
            FILTER_BUCKETS,
        )?
        .install_recorder()?;

    describe_counter!(REQUESTS_TOTAL, "Total number of requests processed");
    describe_counter!(PII_DETECTIONS_TOTAL, "Total number of PII entities detected");
    describe_counter!(
        INJECTION_DETECTIONS_TOTAL,
        "Total number of injection attempts detected"
    );
    describe_histogram!(REQUEST_DURATION_SECONDS, "Request duration in seconds");
    describe_histogram!(FILTER_DURATION_SECONDS, "Filter processing duration in seconds");

    gauge!("gateway_info", "version" => version.to_string()).set(1.0);

    Ok(handle)
}
