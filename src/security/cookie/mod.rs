//! Encrypted cookie transport.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → codec.rs (decrypt every inbound cookie, drop forged ones)
//!     → jar.rs (decoded cookies exposed to handlers)
//! Outgoing response:
//!     → jar.rs (queued cookies)
//!     → codec.rs (encrypt those flagged for encryption)
//!     → Set-Cookie headers
//! ```

pub mod codec;
pub mod jar;

pub use codec::{CookieCodec, Decoded, PREFIX_ENCODED_LEN};
pub use jar::{CookieJar, QueuedCookie};
