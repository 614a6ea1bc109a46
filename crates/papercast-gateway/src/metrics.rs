//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record an API request with its duration and status code.
pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    let labels = [("route", route.to_string()), ("status", status.to_string())];
    metrics::counter!("http_requests_total", &labels).increment(1);
    let labels = [("route", route.to_string())];
    metrics::histogram!("http_request_duration_seconds", &labels).record(duration_secs);
}

/// Record a pipeline failure at a given stage.
pub fn record_pipeline_failure(stage: &str, kind: &str) {
    let labels = [("stage", stage.to_string()), ("kind", kind.to_string())];
    metrics::counter!("pipeline_failures_total", &labels).increment(1);
}

/// Record the outcome of one podcast's chunk synthesis.
pub fn record_chunks(synthesized: usize, failed: usize) {
    metrics::counter!("chunks_synthesized_total").increment(synthesized as u64);
    metrics::counter!("chunks_failed_total").increment(failed as u64);
}
