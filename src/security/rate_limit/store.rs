//! Shared counter stores.
//!
//! # Design Decisions
//! - Check-and-increment runs as one server-side script, never as separate
//!   client-side reads and writes
//! - Scripts are addressed by the SHA-256 of their source; a store that lost
//!   its script cache answers [`StoreError::UnknownScript`]
//! - Every counter hash carries its own expiry so memory stays bounded even
//!   when no client cleans up
//! - [`MemoryStore`] reclaims expired hashes of identities that never return
//!   with a sweep on script runs, once per clock second

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::security::rate_limit::script::{HashCommands, Script};

/// Opaque reference to a loaded script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub String);

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key-value store that can run scripts atomically.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Register `script` and return its handle.
    async fn load_script(&self, script: Arc<dyn Script>) -> Result<ScriptHandle, StoreError>;

    /// Run a previously loaded script as a single atomic operation.
    async fn run_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError>;
}

struct StoredHash {
    fields: HashMap<String, i64>,
    expires_at: Option<Duration>,
}

#[derive(Default)]
struct MemoryState {
    hashes: HashMap<String, StoredHash>,
    scripts: HashMap<String, Arc<dyn Script>>,
    last_sweep_secs: Option<u64>,
}

impl MemoryState {
    /// Drop `key` if its expiry has passed.
    fn evict_expired(&mut self, key: &str, now: Duration) {
        let expired = self
            .hashes
            .get(key)
            .and_then(|h| h.expires_at)
            .is_some_and(|at| at <= now);
        if expired {
            self.hashes.remove(key);
        }
    }

    /// Drop every expired hash, at most once per clock second.
    fn sweep_expired(&mut self, now: Duration) {
        let secs = now.as_secs();
        if self.last_sweep_secs == Some(secs) {
            return;
        }
        self.last_sweep_secs = Some(secs);
        self.hashes
            .retain(|_, h| !h.expires_at.is_some_and(|at| at <= now));
    }
}

/// Hash commands bound to a locked state and a fixed instant.
struct Commands<'a> {
    state: &'a mut MemoryState,
    now: Duration,
}

impl HashCommands for Commands<'_> {
    fn hget(&mut self, key: &str, field: &str) -> Option<i64> {
        self.state.evict_expired(key, self.now);
        self.state.hashes.get(key)?.fields.get(field).copied()
    }

    fn hincrby(&mut self, key: &str, field: &str, by: i64) -> i64 {
        self.state.evict_expired(key, self.now);
        let hash = self
            .state
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| StoredHash {
                fields: HashMap::new(),
                expires_at: None,
            });
        let value = hash.fields.entry(field.to_string()).or_insert(0);
        *value += by;
        *value
    }

    fn hdel(&mut self, key: &str, field: &str) -> bool {
        self.state.evict_expired(key, self.now);
        let Some(hash) = self.state.hashes.get_mut(key) else {
            return false;
        };
        let removed = hash.fields.remove(field).is_some();
        if hash.fields.is_empty() {
            self.state.hashes.remove(key);
        }
        removed
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        self.state.evict_expired(key, self.now);
        match self.state.hashes.get_mut(key) {
            Some(hash) => {
                hash.expires_at = Some(self.now + ttl);
                true
            }
            None => false,
        }
    }
}

/// In-process counter store.
///
/// A single mutex serializes every command and script, which gives scripts the
/// same all-or-nothing view a Redis server does. Suitable for one process or
/// for tests; multi-process deployments need a networked [`CounterStore`].
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
        }
    }

    fn with_commands<T>(&self, f: impl FnOnce(&mut dyn HashCommands) -> T) -> T {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        let mut cmds = Commands {
            state: &mut *state,
            now,
        };
        f(&mut cmds)
    }

    pub fn hget(&self, key: &str, field: &str) -> Option<i64> {
        self.with_commands(|cmds| cmds.hget(key, field))
    }

    pub fn hincrby(&self, key: &str, field: &str, by: i64) -> i64 {
        self.with_commands(|cmds| cmds.hincrby(key, field, by))
    }

    pub fn hdel(&self, key: &str, field: &str) -> bool {
        self.with_commands(|cmds| cmds.hdel(key, field))
    }

    pub fn expire(&self, key: &str, ttl: Duration) -> bool {
        self.with_commands(|cmds| cmds.expire(key, ttl))
    }

    /// Remaining lifetime of `key`, `None` if it is missing or never expires.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        state.evict_expired(key, now);
        state
            .hashes
            .get(key)?
            .expires_at
            .map(|at| at.saturating_sub(now))
    }

    /// Field names currently stored under `key`, sorted.
    pub fn fields(&self, key: &str) -> Vec<String> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        state.evict_expired(key, now);
        let mut fields: Vec<String> = state
            .hashes
            .get(key)
            .map(|h| h.fields.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }

    /// Number of hashes currently held, expired or not.
    pub fn key_count(&self) -> usize {
        let state = self.state.lock().expect("memory store mutex poisoned");
        state.hashes.len()
    }

    /// Forget every loaded script, as a restarted server would.
    pub fn flush_scripts(&self) {
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        state.scripts.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn load_script(&self, script: Arc<dyn Script>) -> Result<ScriptHandle, StoreError> {
        let digest = script.digest();
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        state.scripts.insert(digest.clone(), script);
        Ok(ScriptHandle(digest))
    }

    async fn run_script(
        &self,
        handle: &ScriptHandle,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().expect("memory store mutex poisoned");
        let script = state
            .scripts
            .get(&handle.0)
            .cloned()
            .ok_or_else(|| StoreError::UnknownScript(handle.0.clone()))?;
        state.sweep_expired(now);

        let mut cmds = Commands {
            state: &mut *state,
            now,
        };
        script.execute(&mut cmds, keys, args)
    }
}
