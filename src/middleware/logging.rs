//! Request logging middleware.
//!
//! Logs every query with method, path, status code, and latency.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Logs each request once it completes.
///
/// 5xx responses log at WARN, except 503 which is the expected answer while
/// the trade window warms up and logs at DEBUG. `/health` is skipped.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path == "/health" {
        return next.run(request).await;
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_us = start.elapsed().as_micros() as u64;
    let status = response.status().as_u16();

    if status == 503 {
        debug!(method = %method, path = %path, status, latency_us, "Request not ready");
    } else if status >= 500 {
        warn!(method = %method, path = %path, status, latency_us, "Request failed (5xx)");
    } else {
        info!(method = %method, path = %path, status, latency_us, "Request completed");
    }

    response
}
