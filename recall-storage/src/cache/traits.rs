//! Cache store trait, stored entries and statistics.

use chrono::{DateTime, Utc};
use recall_core::{CacheBackendError, CacheKey, CachePriority, TtlPolicy};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A materialized result sequence with its element type erased.
///
/// Entries for different entity types share one store, so rows are kept as
/// `Arc<[T]>` behind `dyn Any` and recovered with [`downcast`](Self::downcast).
#[derive(Clone)]
pub struct CachedRows {
    rows: Arc<dyn Any + Send + Sync>,
    len: usize,
    type_name: &'static str,
}

impl CachedRows {
    pub fn new<T: Send + Sync + 'static>(rows: Arc<[T]>) -> Self {
        Self {
            len: rows.len(),
            type_name: std::any::type_name::<T>(),
            rows: Arc::new(rows),
        }
    }

    /// Recovers the rows if they were stored as `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<[T]>> {
        self.rows.downcast_ref::<Arc<[T]>>().cloned()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for CachedRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRows")
            .field("type_name", &self.type_name)
            .field("len", &self.len)
            .finish()
    }
}

/// A stored entry with its sliding-window bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rows: CachedRows,
    pub inserted_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub sliding: Duration,
    pub priority: CachePriority,
}

impl CacheEntry {
    pub fn new(rows: CachedRows, policy: &TtlPolicy, now: DateTime<Utc>) -> Self {
        Self {
            rows,
            inserted_at: now,
            last_access: now,
            sliding: policy.sliding,
            priority: policy.priority,
        }
    }

    /// An entry expires once `sliding` has elapsed since its last access.
    /// A clock that moved backwards never expires anything.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_access)
            .to_std()
            .map(|idle| idle >= self.sliding)
            .unwrap_or(false)
    }

    /// Restarts the sliding window.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now;
    }
}

/// Entry metadata without the rows, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub inserted_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub sliding: Duration,
    pub priority: CachePriority,
    pub row_count: usize,
}

impl From<&CacheEntry> for EntryMetadata {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            inserted_at: entry.inserted_at,
            last_access: entry.last_access,
            sliding: entry.sliding,
            priority: entry.priority,
            row_count: entry.rows.len(),
        }
    }
}

/// Key-value store behind the result cache.
///
/// Implementations must be safe to call from many threads at once,
/// including `remove_prefix` racing with `get` and `insert`.
pub trait CacheStore: Send + Sync {
    /// Looks up an unexpired entry and restarts its sliding window.
    /// Expired entries are removed and reported as absent.
    fn get(&self, key: &CacheKey) -> Result<Option<CachedRows>, CacheBackendError>;

    /// Stores rows under `key`, replacing any existing entry.
    fn insert(
        &self,
        key: CacheKey,
        rows: CachedRows,
        policy: &TtlPolicy,
    ) -> Result<(), CacheBackendError>;

    /// Removes every entry whose key starts with `prefix`. Returns the
    /// number removed.
    fn remove_prefix(&self, prefix: &str) -> Result<u64, CacheBackendError>;

    /// Removes every entry whose sliding window has lapsed. Returns the
    /// number removed.
    fn purge_expired(&self) -> Result<u64, CacheBackendError>;

    /// Metadata for `key` without touching its window.
    fn metadata(&self, key: &CacheKey) -> Option<EntryMetadata>;

    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Calls served without touching the store.
    pub bypasses: u64,
    /// Number of entries written.
    pub inserts: u64,
    /// Entries removed by expiry or invalidation.
    pub evictions: u64,
    /// Backend failures that were swallowed.
    pub backend_errors: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Bypasses are not lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_cached_rows_downcast() {
        let rows = CachedRows::new(Arc::<[i32]>::from(vec![1, 2, 3]));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.downcast::<i32>().as_deref(), Some(&[1, 2, 3][..]));
        assert!(rows.downcast::<String>().is_none());
    }

    #[test]
    fn test_entry_sliding_expiry() {
        let rows = CachedRows::new(Arc::<[u8]>::from(Vec::new()));
        let mut entry = CacheEntry::new(rows, &TtlPolicy::sliding_secs(10), at(0));
        assert!(!entry.is_expired(at(9)));
        assert!(entry.is_expired(at(10)));

        entry.touch(at(9));
        assert!(!entry.is_expired(at(18)));
        assert!(entry.is_expired(at(19)));
    }

    #[test]
    fn test_backwards_clock_never_expires() {
        let rows = CachedRows::new(Arc::<[u8]>::from(Vec::new()));
        let entry = CacheEntry::new(rows, &TtlPolicy::sliding_secs(1), at(100));
        assert!(!entry.is_expired(at(0)));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            bypasses: 10,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
