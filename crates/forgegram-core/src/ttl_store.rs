//! Concurrent key/value map whose entries self-invalidate after a per-entry deadline.
//!
//! Reads of an entry past its deadline behave exactly like a miss and evict the
//! entry as a side effect. `cleanup` only bounds memory; correctness never
//! depends on it being called. All operations take `&self` and lock at most the
//! shard holding the key, so unrelated keys never wait on each other.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::time_utils::{current_unix_timestamp_ms, deadline_after, is_expired_unix_ms};

/// Source of wall-clock time for expiry decisions.
pub trait Clock: Send + Sync {
    fn now_unix_ms(&self) -> u64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        current_unix_timestamp_ms()
    }
}

/// Manually advanced clock for deterministic expiry tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_unix_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_unix_ms: u64) -> Self {
        Self {
            now_unix_ms: AtomicU64::new(now_unix_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .now_unix_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(by_ms))
            });
    }

    pub fn set(&self, now_unix_ms: u64) {
        self.now_unix_ms.store(now_unix_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_ms(&self) -> u64 {
        self.now_unix_ms.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct TtlEntry<V> {
    value: V,
    expires_unix_ms: u64,
}

/// Generic expiring map shared by every ephemeral state table.
pub struct TtlStore<K, V> {
    entries: DashMap<K, TtlEntry<V>>,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Inserts or overwrites `key`; the entry expires `ttl` from now.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let expires_unix_ms = deadline_after(self.clock.now_unix_ms(), ttl);
        self.entries.insert(
            key,
            TtlEntry {
                value,
                expires_unix_ms,
            },
        );
    }

    /// Returns the live value for `key`. An expired entry reads as a miss and is evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_unix_ms();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if !is_expired_unix_ms(entry.expires_unix_ms, now) => {
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }
        // Only evict if no newer set landed between the read and the removal.
        self.entries
            .remove_if(key, |_, entry| is_expired_unix_ms(entry.expires_unix_ms, now));
        None
    }

    /// Removes `key` and returns its value if it was still live. Single-use reads go through here.
    pub fn take(&self, key: &K) -> Option<V> {
        let now = self.clock.now_unix_ms();
        let (_, entry) = self.entries.remove(key)?;
        if is_expired_unix_ms(entry.expires_unix_ms, now) {
            return None;
        }
        Some(entry.value)
    }

    /// Removes `key` unconditionally; a no-op when absent.
    pub fn delete(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Evicts every expired entry and returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_unix_ms();
        let mut evicted = 0usize;
        self.entries.retain(|_, entry| {
            let keep = !is_expired_unix_ms(entry.expires_unix_ms, now);
            if !keep {
                evicted = evicted.saturating_add(1);
            }
            keep
        });
        evicted
    }

    /// Number of resident entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for TtlStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for TtlStore<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}
