//! API middleware.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;

/// Client count above which idle clients are dropped from the limiter.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Per-client quota on the submission routes.
pub struct SubmissionRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl SubmissionRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rps);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Whether `ip` may submit another job now.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() >= MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
            debug!("Rate limiter pruned to {} clients", self.limiter.len());
        }
        self.limiter.check_key(&ip).is_ok()
    }

    /// Clients currently holding limiter state.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, Method};

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .allow_origin(Any)
            .max_age(Duration::from_secs(600))
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
            .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE, header::CONTENT_DISPOSITION])
            .allow_origin(origins)
            .max_age(Duration::from_secs(600))
    }
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }
    response
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    // status polling is too chatty to log at info
    let quiet = matches!(uri.path(), "/health" | "/ready" | "/metrics") || uri.path().ends_with("/status");
    if !quiet {
        info!(
            method = %method,
            uri = %uri,
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            "Request completed"
        );
    }

    response
}

/// Rate limiting middleware using the IP-based limiter.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<SubmissionRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = extract_client_ip(&request) {
        if !rate_limiter.check(ip) {
            warn!(ip = %ip, "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", "1")],
                "Rate limit exceeded. Please try again later.",
            )
                .into_response();
        }
    }

    next.run(request).await
}

/// Client IP from proxy headers or the connection.
fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    if let Some(forwarded) = request.headers().get("X-Forwarded-For") {
        if let Some(first) = forwarded.to_str().ok().and_then(|s| s.split(',').next()) {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }

    if let Some(ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
    {
        return Some(ip);
    }

    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_is_per_client() {
        let limiter = SubmissionRateLimiter::new(1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let other: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
        assert!(limiter.check(other));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_forwarded_for_wins() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_client_ip(&request), Some("203.0.113.7".parse().unwrap()));
    }
}
