//! CSRF token validation.
//!
//! A request is either exempt (methods other than GET, POST, PUT, PATCH and
//! DELETE) or checked. A checked request must present a token, taken from the
//! first of: the plain header, the encrypted header, the form field. It must
//! equal the session's canonical token under a constant-time comparison.

use axum::http::{HeaderMap, Method};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::CsrfConfig;
use crate::security::csrf::session::CsrfSession;

/// Where a candidate token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Header,
    EncryptedHeader,
    FormField,
}

/// Why a checked request was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CsrfError {
    #[error("no CSRF token in request")]
    Missing,

    #[error("CSRF token does not match session")]
    Mismatch,

    #[error("no session to validate the CSRF token against")]
    NoSession,
}

impl CsrfError {
    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            CsrfError::Missing => "missing",
            CsrfError::Mismatch => "mismatch",
            CsrfError::NoSession => "no_session",
        }
    }
}

/// Stateless CSRF gate.
#[derive(Debug, Clone)]
pub struct CsrfValidator {
    header: String,
    encrypted_header: String,
    form_field: String,
}

impl CsrfValidator {
    pub fn new(
        header: impl Into<String>,
        encrypted_header: impl Into<String>,
        form_field: impl Into<String>,
    ) -> Self {
        Self {
            header: header.into(),
            encrypted_header: encrypted_header.into(),
            form_field: form_field.into(),
        }
    }

    pub fn from_config(config: &CsrfConfig) -> Self {
        Self::new(&config.header, &config.encrypted_header, &config.form_field)
    }

    /// Whether requests with `method` are checked.
    pub fn requires_check(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    /// Find the first candidate token.
    pub fn extract(
        &self,
        headers: &HeaderMap,
        form: Option<&[u8]>,
        session: &dyn CsrfSession,
    ) -> Option<(TokenSource, String)> {
        if let Some(token) = header_str(headers, &self.header) {
            return Some((TokenSource::Header, token.to_string()));
        }

        if let Some(token) = header_str(headers, &self.encrypted_header)
            .and_then(|value| session.decrypt_xsrf_token(value))
        {
            return Some((TokenSource::EncryptedHeader, token));
        }

        form.and_then(|body| {
            url::form_urlencoded::parse(body)
                .find(|(key, _)| key == self.form_field.as_str())
                .map(|(_, value)| (TokenSource::FormField, value.into_owned()))
        })
    }

    /// Decide whether a request may proceed.
    pub fn validate(
        &self,
        method: &Method,
        headers: &HeaderMap,
        form: Option<&[u8]>,
        session: Option<&dyn CsrfSession>,
    ) -> Result<(), CsrfError> {
        if !Self::requires_check(method) {
            return Ok(());
        }

        let Some(session) = session else {
            tracing::warn!(method = %method, "CSRF check without a session");
            return Err(CsrfError::NoSession);
        };

        let Some((source, candidate)) = self.extract(headers, form, session) else {
            tracing::warn!(method = %method, "CSRF token missing from request");
            return Err(CsrfError::Missing);
        };

        let expected = session.csrf_token().unwrap_or_default();
        if !expected.is_empty() && tokens_match(&candidate, &expected) {
            tracing::trace!(source = ?source, "CSRF token accepted");
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Constant-time string equality.
pub fn tokens_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
