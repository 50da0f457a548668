//! HTTP integration subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → middleware/ (rate limit, cookies, session, CSRF)
//!     → handler
//!     → middleware/ (encrypt queued cookies, rate limit headers)
//!     → Send to client
//! ```

pub mod middleware;
pub mod server;

pub use server::{HttpServer, ShieldState};
