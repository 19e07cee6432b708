//! Unit-of-work glue: cached reads and write-driven invalidation.

use crate::cache::{CacheStore, InMemoryCacheStore, QueryCache};
use recall_core::{Entity, IncludePath, Predicate, RecallError, TtlPolicy};
use std::sync::Arc;
use tracing::debug;

/// Source of rows on a cache miss.
pub trait QueryBackend<T: Entity>: Send + Sync {
    type Error: From<RecallError>;

    /// Runs the query against the backing store and materializes the rows.
    fn load(
        &self,
        predicate: Option<&Predicate>,
        includes: &[IncludePath],
    ) -> Result<Vec<T>, Self::Error>;
}

/// Receives the writes-occurred signal after each commit and clears the
/// query cache when it is raised.
pub struct WriteTracker<S: CacheStore = InMemoryCacheStore> {
    cache: Arc<QueryCache<S>>,
}

impl<S: CacheStore> WriteTracker<S> {
    pub fn new(cache: Arc<QueryCache<S>>) -> Self {
        Self { cache }
    }

    /// Returns the number of entries cleared.
    pub fn on_commit(&self, writes_occurred: bool) -> u64 {
        if !writes_occurred {
            debug!("commit without writes, query cache kept");
            return 0;
        }
        self.cache.clear_all()
    }
}

impl<S: CacheStore> Clone for WriteTracker<S> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

/// A unit of work over a shared [`QueryCache`].
///
/// Reads go through the cache. Modifications set a dirty flag, and a
/// successful [`commit`](Self::commit) hands the flag to the
/// [`WriteTracker`] and resets it.
pub struct Session<S: CacheStore = InMemoryCacheStore> {
    cache: Arc<QueryCache<S>>,
    tracker: WriteTracker<S>,
    policy: TtlPolicy,
    dirty: bool,
}

impl<S: CacheStore> Session<S> {
    pub fn new(cache: Arc<QueryCache<S>>, policy: TtlPolicy) -> Self {
        Self {
            tracker: WriteTracker::new(Arc::clone(&cache)),
            cache,
            policy,
            dirty: false,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn with_policy(mut self, policy: TtlPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cached query through `backend`.
    pub fn find<T, B>(
        &self,
        backend: &B,
        predicate: Option<&Predicate>,
        includes: &[IncludePath],
    ) -> Result<Arc<[T]>, B::Error>
    where
        T: Entity,
        B: QueryBackend<T>,
    {
        self.cache.get_or_compute(
            predicate,
            includes,
            || backend.load(predicate, includes),
            &self.policy,
        )
    }

    /// Records that an entity was added, changed or removed.
    pub fn mark_modified(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Runs `save`. On success, signals the tracker with the dirty flag and
    /// resets it. On failure nothing is signalled and the flag is kept.
    pub fn commit<R, E>(&mut self, save: impl FnOnce() -> Result<R, E>) -> Result<R, E> {
        let saved = save()?;
        let writes_occurred = std::mem::take(&mut self.dirty);
        let cleared = self.tracker.on_commit(writes_occurred);
        debug!(writes_occurred, cleared, "session committed");
        Ok(saved)
    }
}
