//! Cookie value encryption.
//!
//! An encrypted value is `b64(prefix) ++ b64(ciphertext)` where both segments
//! are base64url without padding. The prefix is the first 16 bytes of a keyed
//! signature over the cookie *name*, so it always encodes to exactly 22
//! characters and never depends on the value. Matching it tells us a cookie
//! is ours without a guessable marker; the AEAD (bound to the name as
//! associated data) then tells intact values from forged ones.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use cookie::Cookie;
use dashmap::DashMap;
use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::security::crypto::CryptoEngine;

/// Signing context for the name prefix.
pub const PREFIX_CONTEXT: &str = "http-cookie-prefix";

/// Encryption context for cookie values.
pub const VALUE_CONTEXT: &str = "http-cookie";

/// Raw prefix length in bytes.
pub const PREFIX_BYTES: usize = 16;

/// Encoded prefix length in characters.
pub const PREFIX_ENCODED_LEN: usize = 22;

/// Outcome of decoding an inbound cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The value was ours and authenticated.
    Decrypted(String),
    /// The value is not one of ours; forward it untouched.
    Unchanged(String),
    /// The value carries our prefix but fails authentication; drop it.
    Rejected,
}

impl Decoded {
    /// Collapse into the plain value, `None` when the cookie must be dropped.
    pub fn into_value(self) -> Option<String> {
        match self {
            Decoded::Decrypted(value) | Decoded::Unchanged(value) => Some(value),
            Decoded::Rejected => None,
        }
    }
}

/// Encrypts outbound and decrypts inbound cookie values.
pub struct CookieCodec {
    engine: Arc<dyn CryptoEngine>,
    ignore: HashSet<String>,
    prefixes: DashMap<String, String>,
    min_len: usize,
}

impl CookieCodec {
    pub fn new<I, S>(engine: Arc<dyn CryptoEngine>, ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let min_len = PREFIX_ENCODED_LEN + encoded_len(engine.min_ciphertext_len());
        Self {
            engine,
            ignore: ignore.into_iter().map(Into::into).collect(),
            prefixes: DashMap::new(),
            min_len,
        }
    }

    /// Whether `name` is never encrypted.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }

    /// Shortest value that could be an encrypted cookie.
    pub fn min_encrypted_len(&self) -> usize {
        self.min_len
    }

    /// Return a copy of `cookie` with its value encrypted and bound to its name.
    pub fn encrypt(&self, cookie: &Cookie<'_>) -> Result<Cookie<'static>, CryptoError> {
        let name = cookie.name();
        let prefix = self.prefix(name)?;
        let ciphertext = self.engine.encrypt(cookie.value(), VALUE_CONTEXT, name)?;

        let mut encrypted = cookie.clone().into_owned();
        encrypted.set_value(format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(ciphertext)));
        Ok(encrypted)
    }

    /// Decode an inbound value. `None` means the cookie is ours but corrupted
    /// or forged and must be dropped.
    pub fn decrypt(&self, name: &str, raw: &str) -> Option<String> {
        self.decode(name, raw).into_value()
    }

    /// Decode an inbound value, distinguishing every outcome.
    pub fn decode(&self, name: &str, raw: &str) -> Decoded {
        if raw.len() < self.min_len || self.is_ignored(name) || !is_base64url(raw) {
            return Decoded::Unchanged(raw.to_string());
        }

        let expected = match self.lookup_prefix(name) {
            Ok(prefix) => prefix,
            Err(e) => {
                tracing::error!(cookie = %name, error = %e, "Cookie prefix signing failed");
                return Decoded::Unchanged(raw.to_string());
            }
        };

        let (prefix, body) = raw.split_at(PREFIX_ENCODED_LEN);
        if !bool::from(prefix.as_bytes().ct_eq(expected.as_bytes())) {
            return Decoded::Unchanged(raw.to_string());
        }

        let Ok(ciphertext) = URL_SAFE_NO_PAD.decode(body) else {
            return Decoded::Rejected;
        };

        match self.engine.decrypt(&ciphertext, VALUE_CONTEXT, name) {
            Ok(value) => Decoded::Decrypted(value),
            Err(e) => {
                tracing::debug!(cookie = %name, error = %e, "Encrypted cookie failed authentication");
                Decoded::Rejected
            }
        }
    }

    /// Number of memoized prefixes.
    pub fn cached_prefixes(&self) -> usize {
        self.prefixes.len()
    }

    /// Prefix for a name this application encrypts; memoized.
    fn prefix(&self, name: &str) -> Result<String, CryptoError> {
        if let Some(prefix) = self.prefixes.get(name) {
            return Ok(prefix.value().clone());
        }

        let prefix = self.sign_prefix(name)?;
        self.prefixes.insert(name.to_string(), prefix.clone());
        Ok(prefix)
    }

    /// Prefix for an inbound name. Client-chosen names are never memoized.
    fn lookup_prefix(&self, name: &str) -> Result<String, CryptoError> {
        match self.prefixes.get(name) {
            Some(prefix) => Ok(prefix.value().clone()),
            None => self.sign_prefix(name),
        }
    }

    fn sign_prefix(&self, name: &str) -> Result<String, CryptoError> {
        let signature = self.engine.sign(name.as_bytes(), PREFIX_CONTEXT)?;
        let raw = signature.get(..PREFIX_BYTES).ok_or(CryptoError::InvalidKey)?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }
}

/// Unpadded base64 length of `bytes` bytes.
fn encoded_len(bytes: usize) -> usize {
    (bytes * 4).div_ceil(3)
}

fn is_base64url(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
