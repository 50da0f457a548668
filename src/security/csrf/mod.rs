//! Cross-site request forgery protection.

pub mod session;
pub mod validator;

pub use session::{CsrfSession, SessionContext, SignedSession, XSRF_COOKIE};
pub use validator::{tokens_match, CsrfError, CsrfValidator, TokenSource};
