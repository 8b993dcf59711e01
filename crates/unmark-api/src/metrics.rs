//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "unmark_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "unmark_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "unmark_http_requests_in_flight";

    // Job metrics
    pub const JOBS_STARTED_TOTAL: &str = "unmark_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "unmark_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "unmark_jobs_failed_total";

    // Delivery metrics
    pub const DOWNLOADS_TOTAL: &str = "unmark_downloads_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record job started.
pub fn record_job_started(engine: &'static str) {
    counter!(names::JOBS_STARTED_TOTAL, "engine" => engine).increment(1);
}

/// Record job completed.
pub fn record_job_completed(engine: &'static str) {
    counter!(names::JOBS_COMPLETED_TOTAL, "engine" => engine).increment(1);
}

/// Record job failed.
pub fn record_job_failed(engine: &'static str) {
    counter!(names::JOBS_FAILED_TOTAL, "engine" => engine).increment(1);
}

/// Record an artifact download.
pub fn record_download() {
    counter!(names::DOWNLOADS_TOTAL).increment(1);
}

/// Collapse per-artifact path segments for metrics labels.
fn sanitize_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/download/") {
        if !rest.is_empty() {
            return "/api/download/:filename".to_string();
        }
    }
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
