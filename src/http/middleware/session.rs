//! Session middleware.
//! Binds every request to a session id and issues the XSRF cookie.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::{Cookie, SameSite};
use uuid::Uuid;

use crate::http::server::ShieldState;
use crate::security::cookie::CookieJar;
use crate::security::csrf::{SessionContext, SignedSession};

pub async fn session_middleware(
    State(state): State<ShieldState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let jar = req.extensions().get::<CookieJar>().cloned().unwrap_or_default();
    let cookie_name = &state.config.cookies.session_cookie;

    // 1. Reuse the session id from the cookie, or start a new session
    let (id, fresh) = match jar.get(cookie_name) {
        Some(id) if !id.is_empty() => (id, false),
        _ => (Uuid::new_v4().to_string(), true),
    };

    let session = match SignedSession::new(id, state.engine.clone()) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to derive session token");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    if fresh {
        tracing::debug!(session = %session.id(), "Starting new session");
        jar.add_unencrypted(
            Cookie::build((cookie_name.clone(), session.id().to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build(),
        );
    }

    // 2. Refresh the XSRF cookie so scripts always hold a current token
    match session.xsrf_cookie() {
        Ok(cookie) => jar.add_unencrypted(cookie),
        Err(e) => tracing::warn!(error = %e, "Failed to issue XSRF cookie"),
    }

    req.extensions_mut().insert(jar);
    req.extensions_mut()
        .insert(SessionContext(Arc::new(session.clone())));
    req.extensions_mut().insert(session);

    next.run(req).await
}
