//! Rate limit observability events.

use std::sync::Mutex;

use crate::observability::metrics;
use crate::security::rate_limit::types::RateLimitResult;

/// Emitted once per check, including degraded ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitEvent {
    /// The request was admitted and the counters moved.
    Updated {
        result: RateLimitResult,
        degraded: bool,
    },
    /// The request was refused.
    Exceeded {
        result: RateLimitResult,
        degraded: bool,
    },
}

impl RateLimitEvent {
    pub fn from_result(result: RateLimitResult, degraded: bool) -> Self {
        if result.allowed {
            RateLimitEvent::Updated { result, degraded }
        } else {
            RateLimitEvent::Exceeded { result, degraded }
        }
    }

    pub fn result(&self) -> &RateLimitResult {
        match self {
            RateLimitEvent::Updated { result, .. } | RateLimitEvent::Exceeded { result, .. } => result,
        }
    }

    /// True when the decision came from the failure policy, not the store.
    pub fn is_degraded(&self) -> bool {
        match self {
            RateLimitEvent::Updated { degraded, .. } | RateLimitEvent::Exceeded { degraded, .. } => {
                *degraded
            }
        }
    }
}

/// Receiver for rate limit events.
pub trait RateLimitEvents: Send + Sync {
    fn dispatch(&self, event: &RateLimitEvent);
}

/// Logs every event and counts it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEvents;

impl RateLimitEvents for TracingEvents {
    fn dispatch(&self, event: &RateLimitEvent) {
        let result = event.result();
        let degraded = event.is_degraded();
        match event {
            RateLimitEvent::Updated { .. } => {
                tracing::debug!(
                    identity = %result.rate_limits.id,
                    remaining_per_second = result.remaining_per_second,
                    remaining_per_minute = result.remaining_per_minute,
                    degraded,
                    "Rate limit updated"
                );
                metrics::record_rate_limit("allowed", degraded);
            }
            RateLimitEvent::Exceeded { .. } => {
                tracing::warn!(
                    identity = %result.rate_limits.id,
                    per_second = result.rate_limits.per_second,
                    per_minute = result.rate_limits.per_minute,
                    reset_time = result.reset_time,
                    degraded,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limit("blocked", degraded);
            }
        }
    }
}

/// Keeps every event in memory. Handy for tests and debugging endpoints.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RateLimitEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RateLimitEvent> {
        self.events.lock().expect("event log mutex poisoned").clone()
    }
}

impl RateLimitEvents for RecordingEvents {
    fn dispatch(&self, event: &RateLimitEvent) {
        self.events
            .lock()
            .expect("event log mutex poisoned")
            .push(event.clone());
    }
}
