//! Rate limiter implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, RateLimitBackend, RateLimitConfig};
use crate::error::StoreError;
use crate::security::rate_limit::events::{RateLimitEvent, RateLimitEvents, TracingEvents};
use crate::security::rate_limit::script::{Script, SlidingWindowScript, ALLOWED, BLOCKED, COUNTER_TTL};
use crate::security::rate_limit::store::{CounterStore, ScriptHandle};
use crate::security::rate_limit::types::{RateLimitResult, RateLimits};

/// Admission control for one caller identity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, limits: &RateLimits) -> RateLimitResult;
}

/// Always admits. For environments without a shared store.
pub struct NoopRateLimiter {
    clock: Arc<dyn Clock>,
}

impl NoopRateLimiter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Default for NoopRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check(&self, limits: &RateLimits) -> RateLimitResult {
        RateLimitResult::unlimited(limits, self.clock.now().as_secs())
    }
}

/// Sliding-window limiter backed by a shared [`CounterStore`].
pub struct StoreRateLimiter {
    store: Arc<dyn CounterStore>,
    script: Arc<dyn Script>,
    handle: RwLock<Option<ScriptHandle>>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn RateLimitEvents>,
    key_prefix: String,
    failure_policy: FailurePolicy,
}

impl StoreRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            script: Arc::new(SlidingWindowScript),
            handle: RwLock::new(None),
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingEvents),
            key_prefix: key_prefix.into(),
            failure_policy: FailurePolicy::Open,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn RateLimitEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Store key for an identity.
    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    async fn load(&self) -> Result<ScriptHandle, StoreError> {
        let handle = self.store.load_script(self.script.clone()).await?;
        *self.handle.write().expect("script handle lock poisoned") = Some(handle.clone());
        Ok(handle)
    }

    async fn cached_handle(&self) -> Result<ScriptHandle, StoreError> {
        let cached = self.handle.read().expect("script handle lock poisoned").clone();
        match cached {
            Some(handle) => Ok(handle),
            None => self.load().await,
        }
    }

    /// Run the script, reloading it once if the store forgot it.
    async fn run(&self, keys: &[String], args: &[i64]) -> Result<Vec<i64>, StoreError> {
        let handle = self.cached_handle().await?;
        match self.store.run_script(&handle, keys, args).await {
            Err(StoreError::UnknownScript(_)) => {
                tracing::info!(handle = %handle, "Rate limit script unknown to store, reloading");
                let handle = self.load().await?;
                self.store.run_script(&handle, keys, args).await
            }
            other => other,
        }
    }

    fn degrade(&self, limits: &RateLimits, now_secs: u64) -> RateLimitResult {
        match self.failure_policy {
            FailurePolicy::Open => RateLimitResult::fail_open(limits, now_secs),
            FailurePolicy::Closed => RateLimitResult::fail_closed(limits, now_secs),
        }
    }
}

/// Turn a script reply into a result, `None` if it is malformed.
fn parse_reply(reply: &[i64], limits: &RateLimits, now_secs: u64) -> Option<RateLimitResult> {
    let &[status, remaining_second, remaining_minute] = reply else {
        return None;
    };
    let allowed = match status {
        ALLOWED => true,
        BLOCKED => false,
        _ => return None,
    };
    Some(RateLimitResult {
        allowed,
        remaining_per_second: clamp_remaining(remaining_second),
        remaining_per_minute: clamp_remaining(remaining_minute),
        reset_time: RateLimitResult::next_minute(now_secs),
        rate_limits: limits.clone(),
    })
}

fn clamp_remaining(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    async fn check(&self, limits: &RateLimits) -> RateLimitResult {
        let now_secs = self.clock.now().as_secs();
        let second = now_secs as i64;
        let minute = second / 60;

        let keys = [self.key_for(&limits.id)];
        let args = [
            second,
            minute,
            i64::from(limits.per_second),
            i64::from(limits.per_minute),
            COUNTER_TTL.as_secs() as i64,
        ];

        let (result, degraded) = match self.run(&keys, &args).await {
            Ok(reply) => match parse_reply(&reply, limits, now_secs) {
                Some(result) => (result, false),
                None => {
                    tracing::error!(identity = %limits.id, reply = ?reply, "Malformed rate limit reply");
                    (self.degrade(limits, now_secs), true)
                }
            },
            Err(e) => {
                tracing::error!(
                    identity = %limits.id,
                    error = %e,
                    policy = ?self.failure_policy,
                    "Rate limit store failed"
                );
                (self.degrade(limits, now_secs), true)
            }
        };

        self.events
            .dispatch(&RateLimitEvent::from_result(result.clone(), degraded));
        result
    }
}

/// Build the limiter selected by `config`.
pub fn build_rate_limiter(
    config: &RateLimitConfig,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn RateLimitEvents>,
) -> Arc<dyn RateLimiter> {
    if !config.enabled || config.backend == RateLimitBackend::Noop {
        return Arc::new(NoopRateLimiter::with_clock(clock));
    }
    Arc::new(
        StoreRateLimiter::new(store, &config.key_prefix)
            .with_clock(clock)
            .with_events(events)
            .with_failure_policy(config.failure_policy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::rate_limit::events::RecordingEvents;
    use crate::security::rate_limit::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const START: u64 = 1_700_000_000;

    fn limiter(clock: Arc<ManualClock>) -> (StoreRateLimiter, Arc<MemoryStore>, Arc<RecordingEvents>) {
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let events = Arc::new(RecordingEvents::new());
        let limiter = StoreRateLimiter::new(store.clone(), "rl:")
            .with_clock(clock)
            .with_events(events.clone());
        (limiter, store, events)
    }

    /// Fails a fixed number of script runs, then delegates.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
        error: StoreError,
    }

    #[async_trait]
    impl CounterStore for FlakyStore {
        async fn load_script(&self, script: Arc<dyn Script>) -> Result<ScriptHandle, StoreError> {
            self.inner.load_script(script).await
        }

        async fn run_script(
            &self,
            handle: &ScriptHandle,
            keys: &[String],
            args: &[i64],
        ) -> Result<Vec<i64>, StoreError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            self.inner.run_script(handle, keys, args).await
        }
    }

    struct GarbageStore;

    #[async_trait]
    impl CounterStore for GarbageStore {
        async fn load_script(&self, _script: Arc<dyn Script>) -> Result<ScriptHandle, StoreError> {
            Ok(ScriptHandle("garbage".into()))
        }

        async fn run_script(
            &self,
            _handle: &ScriptHandle,
            _keys: &[String],
            _args: &[i64],
        ) -> Result<Vec<i64>, StoreError> {
            Ok(vec![7])
        }
    }

    fn flaky(failures: usize, error: StoreError) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
            error,
        })
    }

    #[tokio::test]
    async fn test_windowing() {
        let clock = Arc::new(ManualClock::at_secs(START));
        let (limiter, _, _) = limiter(clock.clone());
        let limits = RateLimits::new("user-1", 2, 10);

        let first = limiter.check(&limits).await;
        let second = limiter.check(&limits).await;
        let third = limiter.check(&limits).await;
        assert!(first.allowed && second.allowed && !third.allowed);
        assert_eq!((first.remaining_per_second, first.remaining_per_minute), (1, 9));
        assert_eq!((third.remaining_per_second, third.remaining_per_minute), (0, 8));

        clock.advance(Duration::from_secs(1));
        let next = limiter.check(&limits).await;
        assert!(next.allowed);
        assert_eq!(next.remaining_per_second, 1);
        assert_eq!(next.remaining_per_minute, 7);
    }

    #[tokio::test]
    async fn test_minute_limit_blocks_across_seconds() {
        let clock = Arc::new(ManualClock::at_secs(START - START % 60));
        let (limiter, _, _) = limiter(clock.clone());
        let limits = RateLimits::new("user-1", 5, 3);

        for _ in 0..3 {
            assert!(limiter.check(&limits).await.allowed);
            clock.advance(Duration::from_secs(1));
        }
        let blocked = limiter.check(&limits).await;
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining_per_minute, 0);

        clock.advance(Duration::from_secs(60));
        assert!(limiter.check(&limits).await.allowed);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let clock = Arc::new(ManualClock::at_secs(START));
        let (limiter, _, _) = limiter(clock);

        assert!(limiter.check(&RateLimits::new("a", 1, 10)).await.allowed);
        assert!(!limiter.check(&RateLimits::new("a", 1, 10)).await.allowed);
        assert!(limiter.check(&RateLimits::new("b", 1, 10)).await.allowed);
    }

    #[tokio::test]
    async fn test_counter_record_layout() {
        let clock = Arc::new(ManualClock::at_secs(START));
        let (limiter, store, _) = limiter(clock.clone());
        let limits = RateLimits::new("user-1", 10, 100);

        limiter.check(&limits).await;
        clock.advance(Duration::from_secs(1));
        limiter.check(&limits).await;
        clock.advance(Duration::from_secs(1));
        limiter.check(&limits).await;

        let minute = START / 60;
        let mut expected = vec![
            format!("s:{}", START + 1),
            format!("s:{}", START + 2),
            format!("m:{}", minute),
        ];
        if (START + 2) / 60 != minute {
            expected.push(format!("m:{}", minute + 1));
        }
        expected.sort();
        assert_eq!(store.fields("rl:user-1"), expected);
        assert_eq!(store.ttl("rl:user-1"), Some(COUNTER_TTL));
    }

    #[tokio::test]
    async fn test_reset_time_is_next_minute() {
        let clock = Arc::new(ManualClock::at_secs(125));
        let (limiter, _, _) = limiter(clock);
        let result = limiter.check(&RateLimits::new("x", 1, 1)).await;
        assert_eq!(result.reset_time, 180);
    }

    #[tokio::test]
    async fn test_reloads_script_after_store_restart() {
        let clock = Arc::new(ManualClock::at_secs(START));
        let (limiter, store, events) = limiter(clock);
        let limits = RateLimits::new("user-1", 5, 50);

        assert!(limiter.check(&limits).await.allowed);
        store.flush_scripts();
        let result = limiter.check(&limits).await;

        assert!(result.allowed);
        assert_eq!(result.remaining_per_second, 3);
        assert!(events.events().iter().all(|e| !e.is_degraded()));
    }

    #[tokio::test]
    async fn test_two_failures_fail_open() {
        let store = flaky(2, StoreError::UnknownScript("x".into()));
        let events = Arc::new(RecordingEvents::new());
        let limiter = StoreRateLimiter::new(store, "rl:").with_events(events.clone());
        let limits = RateLimits::new("user-1", 4, 40);

        let result = limiter.check(&limits).await;
        assert!(result.allowed);
        assert_eq!(result.remaining_per_second, 3);
        assert_eq!(result.remaining_per_minute, 39);

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0], RateLimitEvent::Updated { degraded: true, .. }));
    }

    #[tokio::test]
    async fn test_single_unknown_script_is_transparent() {
        let store = flaky(1, StoreError::UnknownScript("x".into()));
        let limiter = StoreRateLimiter::new(store, "rl:");
        let result = limiter.check(&RateLimits::new("user-1", 4, 40)).await;
        assert!(result.allowed);
        assert_eq!(result.remaining_per_second, 3);
    }

    #[tokio::test]
    async fn test_fail_closed_policy() {
        let store = flaky(1, StoreError::Unavailable("connection refused".into()));
        let events = Arc::new(RecordingEvents::new());
        let limiter = StoreRateLimiter::new(store, "rl:")
            .with_events(events.clone())
            .with_failure_policy(FailurePolicy::Closed);

        let result = limiter.check(&RateLimits::new("user-1", 4, 40)).await;
        assert!(!result.allowed);
        assert_eq!(result.remaining_per_second, 0);
        assert!(matches!(events.events()[0], RateLimitEvent::Exceeded { degraded: true, .. }));
    }

    #[tokio::test]
    async fn test_malformed_reply_fails_open() {
        let limiter = StoreRateLimiter::new(Arc::new(GarbageStore), "rl:");
        let result = limiter.check(&RateLimits::new("user-1", 4, 40)).await;
        assert!(result.allowed);
        assert_eq!(result.remaining_per_second, 3);
    }

    #[tokio::test]
    async fn test_every_outcome_emits_event() {
        let clock = Arc::new(ManualClock::at_secs(START));
        let (limiter, _, events) = limiter(clock);
        let limits = RateLimits::new("user-1", 1, 10);

        limiter.check(&limits).await;
        limiter.check(&limits).await;

        let recorded = events.events();
        assert!(matches!(recorded[0], RateLimitEvent::Updated { degraded: false, .. }));
        assert!(matches!(recorded[1], RateLimitEvent::Exceeded { degraded: false, .. }));
    }

    #[tokio::test]
    async fn test_noop_always_allows() {
        let limiter = NoopRateLimiter::with_clock(Arc::new(ManualClock::at_secs(61)));
        let limits = RateLimits::new("x", 1, 1);
        for _ in 0..5 {
            let result = limiter.check(&limits).await;
            assert!(result.allowed);
            assert_eq!(result.reset_time, 120);
        }
    }

    #[test]
    fn test_parse_reply_clamps_negative_remaining() {
        let limits = RateLimits::new("x", 1, 1);
        let result = parse_reply(&[BLOCKED, -3, 2], &limits, 0).unwrap();
        assert_eq!(result.remaining_per_second, 0);
        assert!(parse_reply(&[2, 0, 0], &limits, 0).is_none());
        assert!(parse_reply(&[1, 0], &limits, 0).is_none());
    }
}
