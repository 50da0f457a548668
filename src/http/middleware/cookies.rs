//! Encrypted cookie middleware.
//!
//! Decrypts every inbound cookie before the handler runs, dropping values that
//! carry our prefix but fail authentication, and encrypts queued cookies on the
//! way out.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::Cookie;

use crate::error::ShieldError;
use crate::http::server::ShieldState;
use crate::observability::metrics;
use crate::security::cookie::{CookieCodec, CookieJar, Decoded};

pub async fn cookie_middleware(
    State(state): State<ShieldState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = decode_request_cookies(&state.codec, request.headers_mut());
    request.extensions_mut().insert(jar.clone());

    let mut response = next.run(request).await;

    match write_queued_cookies(
        &state.codec,
        &jar,
        response.headers_mut(),
        state.config.cookies.max_header_bytes,
    ) {
        Ok(()) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to write response cookies");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// Decode the `Cookie` headers in place and return the jar of survivors.
pub fn decode_request_cookies(codec: &CookieCodec, headers: &mut HeaderMap) -> CookieJar {
    let mut kept: Vec<(String, String)> = Vec::new();

    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for parsed in Cookie::split_parse(value) {
            let Ok(cookie) = parsed else {
                continue;
            };
            match codec.decode(cookie.name(), cookie.value()) {
                Decoded::Decrypted(plain) | Decoded::Unchanged(plain) => {
                    kept.push((cookie.name().to_string(), plain));
                }
                Decoded::Rejected => {
                    tracing::warn!(cookie = %cookie.name(), "Dropping cookie that failed authentication");
                    metrics::record_cookie_rejected();
                }
            }
        }
    }

    headers.remove(header::COOKIE);
    let forwarded = kept
        .iter()
        .filter(|(name, value)| {
            let safe = is_header_safe(name) && is_header_safe(value);
            if !safe {
                tracing::debug!(cookie = %name, "Decrypted cookie not representable in a header");
            }
            safe
        })
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    if !forwarded.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(header::COOKIE, value);
        }
    }

    CookieJar::with_inbound(kept)
}

/// Drain the jar onto `Set-Cookie` headers, encrypting where requested.
pub fn write_queued_cookies(
    codec: &CookieCodec,
    jar: &CookieJar,
    headers: &mut HeaderMap,
    max_header_bytes: usize,
) -> Result<(), ShieldError> {
    let mut values = Vec::new();

    for queued in jar.drain_queued() {
        let name = queued.cookie.name().to_string();
        let cookie = if queued.encrypt && !codec.is_ignored(&name) {
            codec.encrypt(&queued.cookie)?
        } else {
            if queued.encrypt {
                tracing::debug!(cookie = %name, "Cookie name is never encrypted, sending as-is");
            }
            queued.cookie
        };

        let serialized = cookie.to_string();
        if serialized.len() > max_header_bytes {
            return Err(ShieldError::CookieTooLarge {
                name,
                len: serialized.len(),
                limit: max_header_bytes,
            });
        }
        let value = HeaderValue::from_str(&serialized)
            .map_err(|_| ShieldError::InvalidHeader(name.clone()))?;
        values.push(value);
    }

    for value in values {
        headers.append(header::SET_COOKIE, value);
    }
    Ok(())
}

fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| b >= 0x20 && b != 0x7f && b != b';')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::crypto::AeadEngine;
    use std::sync::Arc;

    fn codec() -> CookieCodec {
        CookieCodec::new(
            Arc::new(AeadEngine::new("0123456789abcdef0123456789abcdef")),
            ["XSRF-TOKEN"],
        )
    }

    #[test]
    fn test_decode_rewrites_cookie_header() {
        let codec = codec();
        let encrypted = codec.encrypt(&Cookie::new("theme", "dark")).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme={}; plain=1", encrypted.value())).unwrap(),
        );

        let jar = decode_request_cookies(&codec, &mut headers);

        assert_eq!(jar.get("theme").as_deref(), Some("dark"));
        assert_eq!(jar.get("plain").as_deref(), Some("1"));
        assert_eq!(headers.get(header::COOKIE).unwrap(), "theme=dark; plain=1");
    }

    #[test]
    fn test_decode_drops_forged_cookie() {
        let codec = codec();
        let encrypted = codec.encrypt(&Cookie::new("theme", "dark")).unwrap();
        let mut forged = encrypted.value().to_string();
        let last = if forged.ends_with('A') { 'B' } else { 'A' };
        forged.pop();
        forged.push(last);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme={forged}; other=ok")).unwrap(),
        );

        let jar = decode_request_cookies(&codec, &mut headers);
        assert_eq!(jar.get("theme"), None);
        assert_eq!(headers.get(header::COOKIE).unwrap(), "other=ok");
    }

    #[test]
    fn test_write_encrypts_flagged_cookies_only() {
        let codec = codec();
        let jar = CookieJar::new();
        jar.add(Cookie::new("theme", "dark"));
        jar.add_unencrypted(Cookie::new("lang", "en"));
        jar.add(Cookie::new("XSRF-TOKEN", "visible"));

        let mut headers = HeaderMap::new();
        write_queued_cookies(&codec, &jar, &mut headers, 4096).unwrap();

        let set: Vec<_> = headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(set.len(), 3);
        assert!(set[0].starts_with("theme="));
        assert!(!set[0].contains("dark"));
        assert_eq!(set[1], "lang=en");
        assert_eq!(set[2], "XSRF-TOKEN=visible");
    }

    #[test]
    fn test_write_rejects_oversized_cookie() {
        let codec = codec();
        let jar = CookieJar::new();
        jar.add(Cookie::new("blob", "x".repeat(4000)));

        let mut headers = HeaderMap::new();
        let err = write_queued_cookies(&codec, &jar, &mut headers, 4096).unwrap_err();
        assert!(matches!(err, ShieldError::CookieTooLarge { limit: 4096, .. }));
        assert!(headers.get(header::SET_COOKIE).is_none());
    }
}
