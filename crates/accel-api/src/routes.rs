//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    clear_history, get_image_result, get_job_status, get_thumbnail, get_video_result, health, list_history, ready,
    submit_image_filter, submit_image_grayscale, submit_video_filter, submit_video_grayscale,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, SubmissionRateLimiter};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(SubmissionRateLimiter::new(state.config.rate_limit_rps));

    // Submissions are the only routes that create work
    let submit_routes = Router::new()
        .route("/image/grayscale", post(submit_image_grayscale))
        .route("/image/filter", post(submit_image_filter))
        .route("/video/grayscale", post(submit_video_grayscale))
        .route("/video/filter", post(submit_video_filter))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let job_routes = Router::new()
        .route("/jobs/:job_id/status", get(get_job_status))
        .route("/jobs/:job_id/thumbnail", get(get_thumbnail))
        .route("/image/result/:job_id", get(get_image_result))
        .route("/video/result/:job_id", get(get_video_result))
        .route("/history", get(list_history).delete(clear_history));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", submit_routes.merge(job_routes))
        .merge(health_routes)
        .merge(metrics_routes)
        // Multipart has its own 2 MB default; the layer below is the only cap
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
