//! Request security middleware.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (admit or 429)
//!     → cookies.rs (decrypt inbound cookies into a CookieJar)
//!     → session.rs (session id, SessionContext, XSRF cookie)
//!     → csrf.rs (validate token or 419)
//!     → handler
//! Outgoing response:
//!     → cookies.rs (encrypt queued cookies into Set-Cookie)
//!     → rate_limit.rs (X-RateLimit-* headers)
//! ```

pub mod cookies;
pub mod csrf;
pub mod rate_limit;
pub mod session;

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::observability::metrics;

pub use cookies::cookie_middleware;
pub use csrf::csrf_middleware;
pub use rate_limit::rate_limit_middleware;
pub use session::session_middleware;

/// Count every request by method and final status.
pub async fn request_metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16());
    response
}
