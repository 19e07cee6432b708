//! Predicate-level facade: fingerprint, then get-or-compute.

use super::memory::InMemoryCacheStore;
use super::result_cache::ResultCache;
use super::traits::{CacheStats, CacheStore};
use crate::clock::SystemClock;
use recall_core::{
    cache_key, CacheKey, CacheSettings, Entity, IncludePath, Predicate, RecallError, RecallResult,
    TtlPolicy,
};
use std::sync::Arc;

/// Second-level cache for entity queries.
///
/// Construct one explicitly and share it (it is `Send + Sync`); there is no
/// process-wide instance.
pub struct QueryCache<S: CacheStore = InMemoryCacheStore> {
    results: ResultCache<S>,
}

impl QueryCache<InMemoryCacheStore> {
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// In-memory cache that sweeps expired entries at the configured
    /// interval. Pair it with `settings.to_policy()`.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(Arc::new(InMemoryCacheStore::from_settings(
            settings,
            Arc::new(SystemClock),
        )))
    }
}

impl<S: CacheStore> QueryCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            results: ResultCache::new(store),
        }
    }

    /// Returns the cached rows for `predicate` over `T` with the given
    /// eager-load paths, computing and storing them on a miss.
    ///
    /// A predicate whose closed subtrees fail to evaluate is reported as
    /// `RecallError::Evaluation` (converted into `E`) before the store is
    /// consulted. `compute` errors are returned unchanged.
    pub fn get_or_compute<T, E, F>(
        &self,
        predicate: Option<&Predicate>,
        includes: &[IncludePath],
        compute: F,
        policy: &TtlPolicy,
    ) -> Result<Arc<[T]>, E>
    where
        T: Entity,
        E: From<RecallError>,
        F: FnOnce() -> Result<Vec<T>, E>,
    {
        let key = self.key_for::<T>(predicate, includes)?;
        self.results.get_or_compute(&key, policy, compute)
    }

    /// The key `get_or_compute` would use.
    pub fn key_for<T: Entity>(
        &self,
        predicate: Option<&Predicate>,
        includes: &[IncludePath],
    ) -> RecallResult<CacheKey> {
        cache_key(predicate, &T::entity_name(), includes)
    }

    /// Removes every cached query result.
    pub fn clear_all(&self) -> u64 {
        self.results.clear_all()
    }

    pub fn purge_expired(&self) -> u64 {
        self.results.purge_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.results.stats()
    }

    pub fn results(&self) -> &ResultCache<S> {
        &self.results
    }

    pub fn store(&self) -> &S {
        self.results.store()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::{EntityName, EvaluationError, Expr, Lambda, Parameter, TypeRef};
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    struct Article {
        title: String,
    }

    impl Entity for Article {
        fn entity_name() -> EntityName {
            EntityName::new("Article", "tests.Article")
        }
    }

    fn title_filter(param: &str, title: &str) -> Lambda {
        let p = Parameter::new(param, TypeRef::entity("Article"));
        Lambda::predicate(
            p.clone(),
            Expr::param(&p).member("Title", TypeRef::Str).eq(Expr::constant(title)),
        )
    }

    fn articles(titles: &[&str]) -> Vec<Article> {
        titles
            .iter()
            .map(|t| Article {
                title: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_renamed_predicates_share_entry() {
        let cache = QueryCache::in_memory();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, RecallError>(articles(&["hello"]))
        };
        let policy = TtlPolicy::sliding_secs(10);

        cache
            .get_or_compute(Some(&title_filter("a", "hello")), &[], compute, &policy)
            .unwrap();
        let rows = cache
            .get_or_compute(Some(&title_filter("b", "hello")), &[], compute, &policy)
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(rows[0].title, "hello");
        assert_eq!(cache.store().len(), 1);
    }

    #[test]
    fn test_evaluation_error_leaves_store_untouched() {
        let cache = QueryCache::in_memory();
        let p = Parameter::new("a", TypeRef::entity("Article"));
        let bad = Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("Views", TypeRef::Int)
                .eq(Expr::constant(1).rem(Expr::constant(0))),
        );

        let err = cache
            .get_or_compute(
                Some(&bad),
                &[],
                || Ok::<_, RecallError>(articles(&[])),
                &TtlPolicy::sliding_secs(10),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RecallError::Evaluation(EvaluationError::DivideByZero { .. })
        ));
        assert!(cache.store().is_empty());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_from_settings_uses_purge_interval() {
        let settings = CacheSettings::from_toml_str("purge_interval_secs = 15").unwrap();
        let cache = QueryCache::from_settings(&settings);
        assert_eq!(cache.store().purge_interval(), std::time::Duration::from_secs(15));
    }

    #[test]
    fn test_select_all_and_include_paths() {
        let cache = QueryCache::in_memory();
        let tags = IncludePath::parse("Tags").unwrap();
        let all = cache.key_for::<Article>(None, &[]).unwrap();
        let with_tags = cache.key_for::<Article>(None, &[tags]).unwrap();
        assert_ne!(all, with_tags);
    }
}
