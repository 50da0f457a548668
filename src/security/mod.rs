//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit (per-identity admission)
//!     → cookie (decrypt inbound cookies, drop forged ones)
//!     → csrf (token must match the session)
//!     → Pass to handler
//! Outgoing response:
//!     → cookie (encrypt queued cookies)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - CSRF fails closed; rate limiting fails open unless configured otherwise
//! - No trust in client input

pub mod cookie;
pub mod crypto;
pub mod csrf;
pub mod rate_limit;
