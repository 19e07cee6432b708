//! Get-or-compute over a [`CacheStore`].
//!
//! The store is an optimization, never a source of failure: read errors and
//! type mismatches are treated as misses, write errors are logged and
//! dropped. Only `compute` errors reach the caller.

use super::traits::{CacheStats, CacheStore, CachedRows};
use recall_core::{CacheBackendError, CacheKey, TtlPolicy, CACHE_KEY_PREFIX};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result cache keyed by precomputed [`CacheKey`]s.
///
/// There is no single-flight de-duplication: callers racing on a cold key
/// each run `compute` and the last insert wins.
pub struct ResultCache<S: CacheStore> {
    store: Arc<S>,
    bypasses: AtomicU64,
    backend_errors: AtomicU64,
    type_mismatches: AtomicU64,
}

impl<S: CacheStore> ResultCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            bypasses: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            type_mismatches: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the rows cached under `key`, or runs `compute`, stores its
    /// rows under `policy` and returns them.
    ///
    /// A zero sliding window skips the store on both read and write.
    pub fn get_or_compute<T, E, F>(
        &self,
        key: &CacheKey,
        policy: &TtlPolicy,
        compute: F,
    ) -> Result<Arc<[T]>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Vec<T>, E>,
    {
        if policy.is_disabled() {
            self.bypasses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache bypassed");
            return compute().map(Arc::from);
        }

        match self.store.get(key) {
            Ok(Some(rows)) => match rows.downcast::<T>() {
                Some(rows) => {
                    debug!(key = %key, rows = rows.len(), "cache hit");
                    return Ok(rows);
                }
                None => {
                    self.type_mismatches.fetch_add(1, Ordering::Relaxed);
                    self.swallow(
                        "read",
                        key,
                        &CacheBackendError::Corrupted {
                            key: key.to_string(),
                            reason: format!(
                                "stored {} rows, requested {}",
                                rows.type_name(),
                                std::any::type_name::<T>()
                            ),
                        },
                    );
                }
            },
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(err) => self.swallow("read", key, &err),
        }

        let rows: Arc<[T]> = compute()?.into();

        if let Err(err) = self
            .store
            .insert(key.clone(), CachedRows::new(Arc::clone(&rows)), policy)
        {
            self.swallow("write", key, &err);
        } else {
            debug!(
                key = %key,
                rows = rows.len(),
                sliding_secs = policy.sliding.as_secs(),
                priority = %policy.priority,
                "cache populated"
            );
        }

        Ok(rows)
    }

    /// Drops every query result. Returns the number of entries removed.
    pub fn clear_all(&self) -> u64 {
        match self.store.remove_prefix(CACHE_KEY_PREFIX) {
            Ok(removed) => {
                info!(removed, "query cache cleared");
                removed
            }
            Err(err) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "query cache clear failed");
                0
            }
        }
    }

    /// Sweeps entries whose sliding window has lapsed.
    pub fn purge_expired(&self) -> u64 {
        match self.store.purge_expired() {
            Ok(removed) => {
                debug!(removed, "expired cache entries purged");
                removed
            }
            Err(err) => {
                self.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "expired entry purge failed");
                0
            }
        }
    }

    /// Store counters plus this layer's. A lookup whose stored rows had the
    /// wrong type was a hit for the store but is reported as a miss.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.store.stats();
        let mismatches = self.type_mismatches.load(Ordering::Relaxed);
        stats.hits = stats.hits.saturating_sub(mismatches);
        stats.misses += mismatches;
        stats.bypasses += self.bypasses.load(Ordering::Relaxed);
        stats.backend_errors += self.backend_errors.load(Ordering::Relaxed);
        stats
    }

    fn swallow(&self, operation: &'static str, key: &CacheKey, err: &CacheBackendError) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, operation, error = %err, "cache backend error ignored");
    }
}
