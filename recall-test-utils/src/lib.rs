//! RECALL Test Utilities
//!
//! Shared test infrastructure for the RECALL workspace:
//! - Proptest generators for predicate trees over a blog `Post` entity
//! - Fixtures for common filters and rows
//! - Mock query backend and failing cache store
//! - Assertions for RECALL error variants

pub use recall_core::{
    cache_key, CacheBackendError, CacheKey, CachePriority, CacheSettings, Entity, EntityName, EvaluationError,
    Expr, IncludePath, Lambda, Method, Parameter, Predicate, RecallError, RecallResult, Record,
    TtlPolicy, TypeRef, Value,
};
pub use recall_storage::{
    CacheStats, CacheStore, CachedRows, EntryMetadata, InMemoryCacheStore, QueryBackend,
    QueryCache, Session,
};

use chrono::{DateTime, Utc};
use std::convert::Infallible;
use uuid::Uuid;

// ============================================================================
// DOMAIN
// ============================================================================

/// Blog post row used throughout the tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub public_id: Uuid,
    pub title: String,
    pub category: String,
    pub is_published: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Field view used when evaluating a predicate against this row.
    pub fn to_record(&self) -> Record {
        Record::new("Post")
            .with_field("Id", self.id)
            .with_field("PublicId", self.public_id)
            .with_field("Title", self.title.as_str())
            .with_field("Category", self.category.as_str())
            .with_field("IsPublished", self.is_published)
            .with_field("Views", self.views)
            .with_field("CreatedAt", self.created_at)
    }
}

impl Entity for Post {
    fn entity_name() -> EntityName {
        EntityName::new("Post", "recall.tests.Post")
    }
}

/// The bound parameter of a `Post` predicate.
pub fn post_param(name: &str) -> Parameter {
    Parameter::new(name, TypeRef::entity("Post"))
}

/// Renames every reference to the predicate's parameter. Nested lambdas
/// keep their own parameters.
pub fn rename_parameter(predicate: &Lambda, name: &str) -> Lambda {
    let [old] = predicate.parameters() else {
        return predicate.clone();
    };
    let new = Parameter::new(name, old.ty().clone());
    let body = replace_parameter(predicate.body(), old, &Expr::param(&new));
    Lambda::predicate(new, body)
}

/// Does `post` satisfy `predicate`? Evaluated with the interpreter, so only
/// predicates without nested lambdas are supported.
pub fn matches(predicate: &Lambda, post: &Post) -> RecallResult<bool> {
    let [parameter] = predicate.parameters() else {
        return Ok(false);
    };
    let row = Expr::constant_typed(post.to_record(), parameter.ty().clone());
    let bound = replace_parameter(predicate.body(), parameter, &row);
    Ok(recall_core::evaluate(&bound)?.as_bool().unwrap_or(false))
}

fn replace_parameter(expr: &Expr, parameter: &Parameter, with: &Expr) -> Expr {
    let replaced: Result<Expr, Infallible> = match expr {
        Expr::Parameter(p) if p == parameter => Ok(with.clone()),
        other => other.try_map_children(|child| Ok(replace_parameter(child, parameter, with))),
    };
    match replaced {
        Ok(expr) => expr,
        Err(never) => match never {},
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for predicate trees over `Post`.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_parameter_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,10}"
    }

    pub fn arb_category() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("news".to_string()),
            Just("sports".to_string()),
            Just("tech".to_string()),
            "[a-z]{1,12}",
        ]
    }

    /// A leaf comparison over `p`, optionally reading its constant through a
    /// captured closure record.
    pub fn arb_leaf(p: Parameter) -> impl Strategy<Value = Expr> {
        let published = Just(Expr::param(&p).member("IsPublished", TypeRef::Bool));
        let category = {
            let p = p.clone();
            (arb_category(), any::<bool>()).prop_map(move |(category, captured)| {
                let value = if captured {
                    Expr::constant(Record::new("Closure").with_field("category", category))
                        .member("category", TypeRef::Str)
                } else {
                    Expr::constant(category)
                };
                Expr::param(&p).member("Category", TypeRef::Str).eq(value)
            })
        };
        let views = {
            let p = p.clone();
            (-1_000i64..1_000, 1i64..5).prop_map(move |(base, factor)| {
                Expr::param(&p)
                    .member("Views", TypeRef::Int)
                    .gt(Expr::constant(base).mul(Expr::constant(factor)))
            })
        };
        let title = {
            let p = p.clone();
            "[A-Za-z ]{0,8}".prop_map(move |prefix| {
                Expr::param(&p)
                    .member("Title", TypeRef::Str)
                    .call(Method::StartsWith, vec![Expr::constant(prefix)])
            })
        };
        let ids = {
            let p = p.clone();
            prop::collection::vec(0i64..100, 0..6).prop_map(move |ids| {
                Expr::constant(Value::list(ids.into_iter().map(Value::Int)))
                    .call(Method::Contains, vec![Expr::param(&p).member("Id", TypeRef::Int)])
            })
        };
        prop_oneof![published, category, views, title, ids]
    }

    /// A predicate `p => ...` combining leaves with `&&`, `||` and `!`.
    pub fn arb_predicate() -> impl Strategy<Value = Lambda> {
        let p = post_param("p");
        let body = arb_leaf(p.clone()).prop_recursive(3, 16, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| l.and(r)),
                (inner.clone(), inner.clone()).prop_map(|(l, r)| l.or(r)),
                inner.prop_map(Expr::not),
            ]
        });
        body.prop_map(move |body| Lambda::predicate(p.clone(), body))
    }

    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            0i64..100,
            "[A-Za-z ]{0,16}",
            arb_category(),
            any::<bool>(),
            0i64..10_000,
        )
            .prop_map(|(id, title, category, is_published, views)| Post {
                id,
                public_id: Uuid::now_v7(),
                title,
                category,
                is_published,
                views,
                created_at: Utc::now(),
            })
    }

    pub fn arb_include_path() -> impl Strategy<Value = IncludePath> {
        prop_oneof![
            Just(vec!["Tags"]),
            Just(vec!["Author"]),
            Just(vec!["Tags", "Author"]),
            Just(vec!["Comments", "Author"]),
        ]
        .prop_filter_map("valid include path", |segments| IncludePath::new(segments).ok())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made filters and rows.

    use super::*;

    /// `p => p.IsPublished && p.Category == category`
    pub fn news_filter(param_name: &str, category: &str) -> Lambda {
        let p = post_param(param_name);
        Lambda::predicate(
            p.clone(),
            Expr::param(&p)
                .member("IsPublished", TypeRef::Bool)
                .and(Expr::param(&p).member("Category", TypeRef::Str).eq(Expr::constant(category))),
        )
    }

    /// Same as [`news_filter`], with the category read from a captured
    /// closure supplied as JSON.
    pub fn captured_news_filter(param_name: &str, category: &str) -> Lambda {
        let p = post_param(param_name);
        let closure = Value::from(serde_json::json!({ "category": category }));
        Lambda::predicate(
            p.clone(),
            Expr::param(&p).member("IsPublished", TypeRef::Bool).and(
                Expr::param(&p)
                    .member("Category", TypeRef::Str)
                    .eq(Expr::constant(closure).member("category", TypeRef::Str)),
            ),
        )
    }

    /// `p => {ids}.Contains(p.Id)` over an inline literal list.
    pub fn id_in_filter(ids: &[i64]) -> Lambda {
        let p = post_param("p");
        Lambda::predicate(
            p.clone(),
            Expr::constant(Value::list(ids.iter().copied().map(Value::Int)))
                .call(Method::Contains, vec![Expr::param(&p).member("Id", TypeRef::Int)]),
        )
    }

    /// Dereferences a null captured author, so folding fails.
    pub fn null_author_filter() -> Lambda {
        let p = post_param("p");
        let closure = Expr::constant(Record::new("Closure").with_field("author", Value::Null));
        Lambda::predicate(
            p.clone(),
            Expr::param(&p).member("Title", TypeRef::Str).eq(closure
                .member("author", TypeRef::entity("User"))
                .member("Name", TypeRef::Str)),
        )
    }

    pub fn post(id: i64, title: &str, category: &str, is_published: bool) -> Post {
        Post {
            id,
            public_id: Uuid::now_v7(),
            title: title.to_string(),
            category: category.to_string(),
            is_published,
            views: id * 10,
            created_at: Utc::now(),
        }
    }

    pub fn sample_posts() -> Vec<Post> {
        vec![
            post(1, "Election night", "news", true),
            post(2, "Budget draft", "news", false),
            post(3, "Cup final", "sports", true),
            post(4, "Rust 2024", "tech", true),
            post(5, "Flood warning", "news", true),
        ]
    }
}

// ============================================================================
// MOCKS
// ============================================================================

pub mod mocks {
    //! Mock collaborators.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    /// In-memory `Post` backend that filters with the interpreter and
    /// counts how often it was asked to load.
    #[derive(Debug, Default)]
    pub struct MockQueryBackend {
        posts: RwLock<Vec<Post>>,
        loads: AtomicUsize,
    }

    impl MockQueryBackend {
        pub fn new(posts: Vec<Post>) -> Self {
            Self {
                posts: RwLock::new(posts),
                loads: AtomicUsize::new(0),
            }
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }

        /// Mutates the backing rows directly, bypassing any session.
        pub fn insert(&self, post: Post) {
            self.posts
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(post);
        }
    }

    impl QueryBackend<Post> for MockQueryBackend {
        type Error = RecallError;

        fn load(
            &self,
            predicate: Option<&Predicate>,
            _includes: &[IncludePath],
        ) -> Result<Vec<Post>, RecallError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let posts = self
                .posts
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut rows = Vec::new();
            for post in posts.iter() {
                let keep = match predicate {
                    Some(predicate) => matches(predicate, post)?,
                    None => true,
                };
                if keep {
                    rows.push(post.clone());
                }
            }
            Ok(rows)
        }
    }

    /// A cache store whose every operation fails.
    #[derive(Debug, Default)]
    pub struct FailingCacheStore {
        pub reads: AtomicUsize,
        pub writes: AtomicUsize,
    }

    impl FailingCacheStore {
        fn unavailable() -> CacheBackendError {
            CacheBackendError::Unavailable {
                reason: "store offline".to_string(),
            }
        }
    }

    impl CacheStore for FailingCacheStore {
        fn get(&self, _key: &CacheKey) -> Result<Option<CachedRows>, CacheBackendError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(Self::unavailable())
        }

        fn insert(
            &self,
            _key: CacheKey,
            _rows: CachedRows,
            _policy: &TtlPolicy,
        ) -> Result<(), CacheBackendError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(Self::unavailable())
        }

        fn remove_prefix(&self, _prefix: &str) -> Result<u64, CacheBackendError> {
            Err(Self::unavailable())
        }

        fn purge_expired(&self) -> Result<u64, CacheBackendError> {
            Err(Self::unavailable())
        }

        fn metadata(&self, _key: &CacheKey) -> Option<EntryMetadata> {
            None
        }

        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! RECALL-specific assertions.

    use super::*;

    pub fn assert_evaluation_error<T: std::fmt::Debug>(result: &RecallResult<T>) {
        assert!(
            matches!(result, Err(RecallError::Evaluation(_))),
            "Expected evaluation error, got {:?}",
            result
        );
    }

    pub fn assert_null_dereference<T: std::fmt::Debug>(result: &RecallResult<T>) {
        assert!(
            matches!(
                result,
                Err(RecallError::Evaluation(EvaluationError::NullDereference { .. }))
            ),
            "Expected null dereference, got {:?}",
            result
        );
    }

    pub fn assert_well_formed_key(key: &CacheKey) {
        assert!(
            key.has_prefix(recall_core::CACHE_KEY_PREFIX),
            "Key {} is missing the query prefix",
            key
        );
        let digest = key.digest();
        assert_eq!(digest.len(), 64, "Digest of {} is not 64 hex chars", key);
        assert!(
            digest.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')),
            "Digest of {} is not lowercase hex",
            key
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_matches_uses_interpreter() {
        let filter = news_filter("p", "news");
        let posts = sample_posts();
        let hits: Vec<i64> = posts
            .iter()
            .filter(|post| matches(&filter, post).unwrap())
            .map(|post| post.id)
            .collect();
        assert_eq!(hits, vec![1, 5]);
    }

    #[test]
    fn test_rename_parameter_keeps_semantics() {
        let renamed = rename_parameter(&news_filter("p", "news"), "post");
        assert_eq!(renamed, news_filter("post", "news"));
    }
}
