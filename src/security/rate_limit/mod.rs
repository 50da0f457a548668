//! Distributed rate limiting.
//!
//! # Data Flow
//! ```text
//! RateLimits {id, per_second, per_minute}
//!     → limiter.rs (current second/minute from the clock)
//!     → store.rs (run script atomically; reload once if unknown)
//!     → script.rs (read both counters, block or increment + expire + cleanup)
//!     → RateLimitResult
//!     → events.rs (RateLimitUpdated / RateLimitExceeded)
//! ```
//!
//! # Design Decisions
//! - Two fixed buckets per identity (second, minute) in one hash
//! - The hash expires 120 seconds after its last increment
//! - Store failures degrade per the configured policy (open by default)
//!
//! Each admitted check deletes the `second - 2` and `minute - 2` buckets. A
//! process whose clock lags by two seconds can see its fresh bucket deleted by
//! a faster peer; the window it undercounts is bounded by that skew.

pub mod events;
pub mod limiter;
pub mod script;
pub mod store;
pub mod types;

pub use events::{RateLimitEvent, RateLimitEvents, RecordingEvents, TracingEvents};
pub use limiter::{build_rate_limiter, NoopRateLimiter, RateLimiter, StoreRateLimiter};
pub use script::{HashCommands, Script, SlidingWindowScript, COUNTER_TTL};
pub use store::{CounterStore, MemoryStore, ScriptHandle};
pub use types::{RateLimitResult, RateLimits};
