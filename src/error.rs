//! Error types shared across the shield.
//!
//! Expected outcomes (a cookie that is not ours, a missing CSRF token, a
//! blocked caller) are ordinary return values. Only the conditions below
//! propagate as errors.

use thiserror::Error;

/// Failures reported by a [`CryptoEngine`](crate::security::crypto::CryptoEngine).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The key material was rejected by the primitive.
    #[error("invalid key material")]
    InvalidKey,

    /// Ciphertext was malformed, forged, or bound to different associated data.
    #[error("ciphertext failed authentication")]
    Authentication,

    /// The decrypted payload is not valid UTF-8.
    #[error("plaintext is not valid UTF-8")]
    Encoding,
}

/// Failures reported by a shared counter store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store does not know the script handle (restart, cache eviction).
    #[error("unknown script handle {0}")]
    UnknownScript(String),

    /// The store could not be reached or refused the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The script was called with arguments it cannot interpret.
    #[error("invalid script arguments: {0}")]
    InvalidArguments(String),
}

/// Hard failures that abort request processing.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// A serialized `Set-Cookie` header exceeded the configured limit.
    #[error("cookie {name} serializes to {len} bytes (limit {limit})")]
    CookieTooLarge {
        name: String,
        len: usize,
        limit: usize,
    },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("invalid header value for {0}")]
    InvalidHeader(String),
}
