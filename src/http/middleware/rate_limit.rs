//! Rate limiting middleware.
//!
//! Resolves the caller's identity and limits, asks the limiter for a decision,
//! and decorates the response with the standard rate limit headers.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::RateLimitConfig;
use crate::http::server::ShieldState;
use crate::security::rate_limit::{RateLimitResult, RateLimits};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Identity used when neither an upstream layer nor the socket names the caller.
pub const ANONYMOUS: &str = "anonymous";

pub async fn rate_limit_middleware(
    State(state): State<ShieldState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let limits = resolve_limits(&req, &state.config.rate_limit);
    let result = state.rate_limiter.check(&limits).await;

    if result.allowed {
        let mut response = next.run(req).await;
        apply_headers(response.headers_mut(), &result);
        return response;
    }

    let now = state.clock.now().as_secs();
    let retry_after = result.retry_after(now);
    tracing::warn!(
        client = %limits.id,
        path = %req.uri().path(),
        retry_after,
        "Rate limit exceeded"
    );

    let mut response = (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
    apply_headers(response.headers_mut(), &result);
    response
        .headers_mut()
        .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

/// Limits set upstream win; otherwise the client address with configured defaults.
pub fn resolve_limits<B>(req: &Request<B>, config: &RateLimitConfig) -> RateLimits {
    if let Some(limits) = req.extensions().get::<RateLimits>() {
        return limits.clone();
    }

    let id = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string());

    RateLimits::new(id, config.per_second, config.per_minute)
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(
        X_RATELIMIT_LIMIT,
        HeaderValue::from(result.rate_limits.per_minute),
    );
    headers.insert(
        X_RATELIMIT_REMAINING,
        HeaderValue::from(result.remaining_per_minute),
    );
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_time));
}
