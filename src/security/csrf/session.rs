//! Session-side CSRF collaborators.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cookie::{Cookie, SameSite};

use crate::error::CryptoError;
use crate::security::crypto::CryptoEngine;

/// Signing context for canonical CSRF tokens.
pub const TOKEN_CONTEXT: &str = "csrf-token";

/// Encryption context for the XSRF cookie/header value.
pub const XSRF_CONTEXT: &str = "xsrf-token";

/// Name of the cookie carrying the encrypted token to browser scripts.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";

/// What the CSRF validator needs from the session store.
pub trait CsrfSession: Send + Sync {
    /// The canonical token bound to this session.
    fn csrf_token(&self) -> Option<String>;

    /// Decrypt a value taken from the encrypted XSRF header.
    fn decrypt_xsrf_token(&self, value: &str) -> Option<String>;
}

/// Request extension carrying the current session.
#[derive(Clone)]
pub struct SessionContext(pub Arc<dyn CsrfSession>);

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionContext(..)")
    }
}

/// Session whose CSRF token is a keyed signature of the session id.
///
/// Nothing is stored server side: the same id always yields the same token.
#[derive(Clone)]
pub struct SignedSession {
    id: String,
    token: String,
    engine: Arc<dyn CryptoEngine>,
}

impl SignedSession {
    pub fn new(id: impl Into<String>, engine: Arc<dyn CryptoEngine>) -> Result<Self, CryptoError> {
        let id = id.into();
        let token = URL_SAFE_NO_PAD.encode(engine.sign(id.as_bytes(), TOKEN_CONTEXT)?);
        Ok(Self { id, token, engine })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Encrypted form of the token for the XSRF cookie.
    pub fn xsrf_value(&self) -> Result<String, CryptoError> {
        let sealed = self.engine.encrypt(&self.token, XSRF_CONTEXT, XSRF_COOKIE)?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Cookie that lets browser scripts echo the token back in a header.
    pub fn xsrf_cookie(&self) -> Result<Cookie<'static>, CryptoError> {
        Ok(Cookie::build((XSRF_COOKIE, self.xsrf_value()?))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(false)
            .build())
    }
}

impl CsrfSession for SignedSession {
    fn csrf_token(&self) -> Option<String> {
        Some(self.token.clone())
    }

    fn decrypt_xsrf_token(&self, value: &str) -> Option<String> {
        let sealed = URL_SAFE_NO_PAD.decode(value.trim()).ok()?;
        self.engine.decrypt(&sealed, XSRF_CONTEXT, XSRF_COOKIE).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::crypto::AeadEngine;

    fn engine() -> Arc<dyn CryptoEngine> {
        Arc::new(AeadEngine::new("0123456789abcdef0123456789abcdef"))
    }

    #[test]
    fn test_token_is_derived_from_session_id() {
        let engine = engine();
        let a = SignedSession::new("session-a", engine.clone()).unwrap();
        let again = SignedSession::new("session-a", engine.clone()).unwrap();
        let b = SignedSession::new("session-b", engine).unwrap();

        assert_eq!(a.token(), again.token());
        assert_ne!(a.token(), b.token());
        assert_eq!(a.csrf_token().as_deref(), Some(a.token()));
    }

    #[test]
    fn test_xsrf_value_roundtrip() {
        let session = SignedSession::new("session-a", engine()).unwrap();
        let value = session.xsrf_value().unwrap();
        assert_eq!(session.decrypt_xsrf_token(&value).as_deref(), Some(session.token()));
        assert_eq!(session.decrypt_xsrf_token("garbage"), None);
    }

    #[test]
    fn test_xsrf_cookie_is_script_readable() {
        let session = SignedSession::new("session-a", engine()).unwrap();
        let cookie = session.xsrf_cookie().unwrap();
        assert_eq!(cookie.name(), XSRF_COOKIE);
        assert_eq!(cookie.http_only(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
