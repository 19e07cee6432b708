//! In-process cache store over a sharded concurrent map.

use super::traits::{CacheEntry, CacheStats, CacheStore, CachedRows, EntryMetadata};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use recall_core::{CacheBackendError, CacheKey, CacheSettings, TtlPolicy, DEFAULT_PURGE_INTERVAL_SECS};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// In-memory [`CacheStore`].
///
/// Entries live in a `DashMap`, so lookups on different shards never
/// contend and a prefix clear only locks one shard at a time.
///
/// Expired entries are dropped when their key is read, by
/// [`purge_expired`](CacheStore::purge_expired), and by a sweep that runs
/// during `insert` once the purge interval has passed since the last one.
pub struct InMemoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
    clock: Arc<dyn Clock>,
    purge_interval_ms: i64,
    last_sweep_ms: AtomicI64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let started = clock.now().timestamp_millis();
        Self {
            entries: DashMap::new(),
            clock,
            purge_interval_ms: millis(Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS)),
            last_sweep_ms: AtomicI64::new(started),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Store using the sweep interval from `settings`.
    pub fn from_settings(settings: &CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(clock).with_purge_interval(settings.purge_interval())
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval_ms = millis(interval);
        self
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.purge_interval_ms).unwrap_or(0))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn retain_counting(&self, mut keep: impl FnMut(&CacheKey, &CacheEntry) -> bool) -> u64 {
        let mut removed = 0u64;
        self.entries.retain(|key, entry| {
            let kept = keep(key, entry);
            if !kept {
                removed += 1;
            }
            kept
        });
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Drops expired entries if the purge interval has passed since the last
    /// sweep. Only the caller that wins the stamp update sweeps.
    fn sweep_if_due(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) < self.purge_interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let removed = self.retain_counting(|_, entry| !entry.is_expired(now));
        if removed > 0 {
            debug!(removed, "expired cache entries swept");
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedRows>, CacheBackendError> {
        let now = self.clock.now();

        let expired = match self.entries.get_mut(key) {
            None => false,
            Some(mut entry) => {
                if !entry.is_expired(now) {
                    entry.touch(now);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.rows.clone()));
                }
                true
            }
        };

        // The shard guard is released; re-check in case a writer replaced
        // the entry in between.
        if expired
            && self
                .entries
                .remove_if(key, |_, entry| entry.is_expired(now))
                .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn insert(
        &self,
        key: CacheKey,
        rows: CachedRows,
        policy: &TtlPolicy,
    ) -> Result<(), CacheBackendError> {
        let now = self.clock.now();
        self.sweep_if_due(now);
        self.entries.insert(key, CacheEntry::new(rows, policy, now));
        self.inserts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<u64, CacheBackendError> {
        Ok(self.retain_counting(|key, _| !key.has_prefix(prefix)))
    }

    fn purge_expired(&self) -> Result<u64, CacheBackendError> {
        let now = self.clock.now();
        Ok(self.retain_counting(|_, entry| !entry.is_expired(now)))
    }

    fn metadata(&self, key: &CacheKey) -> Option<EntryMetadata> {
        self.entries.get(key).map(|entry| EntryMetadata::from(&*entry))
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: 0,
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            backend_errors: 0,
            entry_count: self.entries.len() as u64,
        }
    }
}
