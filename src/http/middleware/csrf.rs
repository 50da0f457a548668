//! CSRF middleware.
//!
//! Runs after the session middleware. Urlencoded bodies are buffered so the
//! form field can be inspected, then handed back to the handler untouched.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::CsrfConfig;
use crate::http::server::ShieldState;
use crate::observability::metrics;
use crate::security::csrf::{CsrfValidator, SessionContext};

pub async fn csrf_middleware(
    State(state): State<ShieldState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let config = &state.config.csrf;
    if !config.enabled
        || !CsrfValidator::requires_check(req.method())
        || is_exempt(config, req.uri().path())
    {
        return next.run(req).await;
    }

    let session = req.extensions().get::<SessionContext>().cloned();

    let (req, form) = if is_urlencoded(req.headers()) {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, config.max_form_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, limit = config.max_form_bytes, "Form body rejected");
                return (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large").into_response();
            }
        };
        (
            Request::from_parts(parts, Body::from(bytes.clone())),
            Some(bytes),
        )
    } else {
        (req, None::<Bytes>)
    };

    let verdict = state.csrf.validate(
        req.method(),
        req.headers(),
        form.as_deref(),
        session.as_ref().map(|ctx| &*ctx.0),
    );

    match verdict {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!(
                method = %req.method(),
                path = %req.uri().path(),
                reason = e.reason(),
                "CSRF validation failed"
            );
            metrics::record_csrf_failure(e.reason());
            token_mismatch_response()
        }
    }
}

/// 419, the conventional "page expired" status for a stale CSRF token.
pub fn token_mismatch_response() -> Response {
    let status = StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN);
    (status, Json(json!({ "error": "csrf_token_mismatch" }))).into_response()
}

fn is_exempt(config: &CsrfConfig, path: &str) -> bool {
    config
        .exempt_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

fn is_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}
