//! Keyed signing and authenticated encryption.
//!
//! [`CryptoEngine`] is the boundary every other security component talks to.
//! [`AeadEngine`] implements it with HMAC-SHA256 signatures and AES-256-GCM,
//! deriving an independent subkey per context string so a signature or
//! ciphertext produced for one purpose is useless for another.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Keyed signing and AEAD operations.
pub trait CryptoEngine: Send + Sync {
    /// Deterministic keyed signature of `message` under `context`.
    fn sign(&self, message: &[u8], context: &str) -> Result<Vec<u8>, CryptoError>;

    /// Encrypt `plaintext`, authenticating `aad` alongside it.
    fn encrypt(&self, plaintext: &str, context: &str, aad: &str) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt and authenticate. Fails if either the ciphertext or `aad` differ
    /// from what was encrypted.
    fn decrypt(&self, ciphertext: &[u8], context: &str, aad: &str) -> Result<String, CryptoError>;

    /// Length in bytes of the shortest ciphertext `encrypt` can produce.
    fn min_ciphertext_len(&self) -> usize;
}

/// HMAC-SHA256 + AES-256-GCM engine keyed by the application key.
#[derive(Clone)]
pub struct AeadEngine {
    app_key: Vec<u8>,
}

impl AeadEngine {
    pub fn new(app_key: impl AsRef<[u8]>) -> Self {
        Self {
            app_key: app_key.as_ref().to_vec(),
        }
    }

    fn hmac(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 32], CryptoError> {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
        for part in parts {
            mac.update(part);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }

    fn subkey(&self, purpose: &[u8], context: &str) -> Result<[u8; 32], CryptoError> {
        Self::hmac(&self.app_key, &[purpose, b":", context.as_bytes()])
    }

    fn cipher(&self, context: &str, salt: &[u8]) -> Result<Aes256Gcm, CryptoError> {
        let context_key = self.subkey(b"encrypt", context)?;
        let message_key = Self::hmac(&context_key, &[salt])?;
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&message_key)))
    }
}

impl std::fmt::Debug for AeadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadEngine").finish_non_exhaustive()
    }
}

impl CryptoEngine for AeadEngine {
    fn sign(&self, message: &[u8], context: &str) -> Result<Vec<u8>, CryptoError> {
        let key = self.subkey(b"sign", context)?;
        Ok(Self::hmac(&key, &[message])?.to_vec())
    }

    fn encrypt(&self, plaintext: &str, context: &str, aad: &str) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = self.cipher(context, &salt)?;
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::InvalidKey)?;

        let mut combined = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&salt);
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    fn decrypt(&self, ciphertext: &[u8], context: &str, aad: &str) -> Result<String, CryptoError> {
        if ciphertext.len() < self.min_ciphertext_len() {
            return Err(CryptoError::Authentication);
        }

        let (salt, rest) = ciphertext.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let cipher = self.cipher(context, salt)?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Encoding)
    }

    fn min_ciphertext_len(&self) -> usize {
        SALT_LEN + NONCE_LEN + TAG_LEN
    }
}
