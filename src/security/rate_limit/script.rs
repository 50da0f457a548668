//! Server-side scripts run atomically by a counter store.
//!
//! Each script carries Lua source for Redis-compatible stores and a native
//! body that [`MemoryStore`](super::store::MemoryStore) executes while holding
//! its lock. Both must implement the same read-modify-write.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Hash commands available to a script while it owns the store.
pub trait HashCommands {
    fn hget(&mut self, key: &str, field: &str) -> Option<i64>;
    fn hincrby(&mut self, key: &str, field: &str, by: i64) -> i64;
    fn hdel(&mut self, key: &str, field: &str) -> bool;
    fn expire(&mut self, key: &str, ttl: Duration) -> bool;
}

/// A script a [`CounterStore`](super::store::CounterStore) can load and run.
pub trait Script: Send + Sync {
    /// Source text evaluated by remote stores.
    fn source(&self) -> &str;

    /// Native body evaluated by in-process stores.
    fn execute(
        &self,
        cmds: &mut dyn HashCommands,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError>;

    /// Content address of the source.
    fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.source().as_bytes()))
    }
}

/// Lifetime of a counter hash after its last increment.
pub const COUNTER_TTL: Duration = Duration::from_secs(120);

/// Reply status for a blocked check.
pub const BLOCKED: i64 = 0;

/// Reply status for an admitted check.
pub const ALLOWED: i64 = 1;

const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local second = tonumber(ARGV[1])
local minute = tonumber(ARGV[2])
local per_second = tonumber(ARGV[3])
local per_minute = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local s_count = tonumber(redis.call('HGET', key, 's:' .. second) or '0')
local m_count = tonumber(redis.call('HGET', key, 'm:' .. minute) or '0')

if s_count >= per_second or m_count >= per_minute then
    return {0, per_second - s_count, per_minute - m_count}
end

s_count = redis.call('HINCRBY', key, 's:' .. second, 1)
m_count = redis.call('HINCRBY', key, 'm:' .. minute, 1)
redis.call('EXPIRE', key, ttl)
redis.call('HDEL', key, 's:' .. (second - 2), 'm:' .. (minute - 2))

return {1, per_second - s_count, per_minute - m_count}
"#;

/// Per-second and per-minute check-and-increment.
///
/// `KEYS = [counter key]`,
/// `ARGV = [second, minute, per_second, per_minute, ttl_secs]`.
/// Replies `[status, remaining_second, remaining_minute]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindowScript;

pub(crate) fn second_field(second: i64) -> String {
    format!("s:{second}")
}

pub(crate) fn minute_field(minute: i64) -> String {
    format!("m:{minute}")
}

impl Script for SlidingWindowScript {
    fn source(&self) -> &str {
        SLIDING_WINDOW_LUA
    }

    fn execute(
        &self,
        cmds: &mut dyn HashCommands,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let [key] = keys else {
            return Err(StoreError::InvalidArguments(format!("expected 1 key, got {}", keys.len())));
        };
        let &[second, minute, per_second, per_minute, ttl] = args else {
            return Err(StoreError::InvalidArguments(format!("expected 5 args, got {}", args.len())));
        };

        let s_field = second_field(second);
        let m_field = minute_field(minute);

        let s_count = cmds.hget(key, &s_field).unwrap_or(0);
        let m_count = cmds.hget(key, &m_field).unwrap_or(0);

        if s_count >= per_second || m_count >= per_minute {
            return Ok(vec![BLOCKED, per_second - s_count, per_minute - m_count]);
        }

        let s_count = cmds.hincrby(key, &s_field, 1);
        let m_count = cmds.hincrby(key, &m_field, 1);
        cmds.expire(key, Duration::from_secs(ttl.max(0) as u64));
        // Stale buckets only; the previous second and minute stay readable.
        cmds.hdel(key, &second_field(second - 2));
        cmds.hdel(key, &minute_field(minute - 2));

        Ok(vec![ALLOWED, per_second - s_count, per_minute - m_count])
    }
}
