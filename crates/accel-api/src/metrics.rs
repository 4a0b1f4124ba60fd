//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use accel_models::Category;

/// Install the Prometheus recorder. The handle renders `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "accel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "accel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "accel_http_requests_in_flight";

    // Admission metrics
    pub const SUBMISSIONS_TOTAL: &str = "accel_submissions_total";
    pub const REJECTIONS_TOTAL: &str = "accel_submissions_rejected_total";
    pub const HISTORY_CLEARED_TOTAL: &str = "accel_history_cleared_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "accel_rate_limit_hits_total";
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

/// Record an admitted submission and the path it took.
pub fn record_submission(category: Category, path: &str) {
    let labels = [("category", category.to_string()), ("path", path.to_string())];
    counter!(names::SUBMISSIONS_TOTAL, &labels).increment(1);
}

/// Record a submission rejected before any job existed.
pub fn record_rejection(category: Category, reason: &str) {
    let labels = [("category", category.to_string()), ("reason", reason.to_string())];
    counter!(names::REJECTIONS_TOTAL, &labels).increment(1);
}

pub fn record_history_cleared(deleted: usize) {
    counter!(names::HISTORY_CLEARED_TOTAL).increment(deleted as u64);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Replace job ids in a path so labels stay bounded.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with("job_") { ":job_id" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
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
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}
