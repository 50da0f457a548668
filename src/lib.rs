//! HTTP request security substrate.
//!
//! Encrypted cookies, CSRF validation and distributed rate limiting as axum
//! middleware, plus the crypto, counter-store and session boundaries they
//! depend on.

// Core building blocks
pub mod clock;
pub mod config;
pub mod error;

// Request protection
pub mod http;
pub mod security;

// Cross-cutting concerns
pub mod observability;

pub use config::schema::ShieldConfig;
pub use error::{CryptoError, ShieldError, StoreError};
pub use http::{HttpServer, ShieldState};
