//! Rate limit request and result types.

use serde::{Deserialize, Serialize};

/// Limits applied to one caller identity for one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Caller identity (user id, API key id, client IP).
    pub id: String,
    pub per_second: u32,
    pub per_minute: u32,
}

impl RateLimits {
    pub fn new(id: impl Into<String>, per_second: u32, per_minute: u32) -> Self {
        Self {
            id: id.into(),
            per_second,
            per_minute,
        }
    }
}

/// Decision for one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining_per_second: u32,
    pub remaining_per_minute: u32,
    /// Unix seconds of the next minute boundary.
    pub reset_time: u64,
    pub rate_limits: RateLimits,
}

impl RateLimitResult {
    /// Start of the minute following `now_secs`.
    pub fn next_minute(now_secs: u64) -> u64 {
        (now_secs / 60 + 1) * 60
    }

    /// Allow with the full budget left. Used when limiting is switched off.
    pub fn unlimited(limits: &RateLimits, now_secs: u64) -> Self {
        Self {
            allowed: true,
            remaining_per_second: limits.per_second,
            remaining_per_minute: limits.per_minute,
            reset_time: Self::next_minute(now_secs),
            rate_limits: limits.clone(),
        }
    }

    /// Allow as if this were the first request in both windows.
    pub fn fail_open(limits: &RateLimits, now_secs: u64) -> Self {
        Self {
            allowed: true,
            remaining_per_second: limits.per_second.saturating_sub(1),
            remaining_per_minute: limits.per_minute.saturating_sub(1),
            reset_time: Self::next_minute(now_secs),
            rate_limits: limits.clone(),
        }
    }

    /// Block with nothing left.
    pub fn fail_closed(limits: &RateLimits, now_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining_per_second: 0,
            remaining_per_minute: 0,
            reset_time: Self::next_minute(now_secs),
            rate_limits: limits.clone(),
        }
    }

    /// Seconds until the reset boundary.
    pub fn retry_after(&self, now_secs: u64) -> u64 {
        self.reset_time.saturating_sub(now_secs)
    }
}
