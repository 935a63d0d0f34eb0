//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, latency and the
//! principal resolved by the authentication filter. Must be layered inside
//! `auth_middleware` to see the principal.

use crate::auth::context::extract_context;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Middleware that logs HTTP requests with timing information.
///
/// Logs at INFO level for successful requests, WARN level for 5xx.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks to reduce noise
    if path == "/health" {
        return next.run(request).await;
    }

    let principal = extract_context(&request)
        .and_then(|ctx| ctx.identity())
        .unwrap_or("anonymous")
        .to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let latency = start.elapsed();
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            principal = %principal,
            "Request failed (5xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status = status,
            latency_ms = latency.as_millis() as u64,
            principal = %principal,
            "Request completed"
        );
    }

    response
}
