//! Second-level cache for materialized query results.
//!
//! [`QueryCache`] fingerprints a predicate into a [`recall_core::CacheKey`]
//! and hands it to [`ResultCache`], which serves hits from a [`CacheStore`]
//! and runs the caller's `compute` on a miss.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::in_memory();
//! let posts: Arc<[Post]> = cache.get_or_compute(
//!     Some(&published_news),
//!     &[IncludePath::parse("Tags")?],
//!     || backend.load_posts(&published_news),
//!     &TtlPolicy::sliding_secs(10),
//! )?;
//! ```

pub mod memory;
pub mod query_cache;
pub mod result_cache;
pub mod traits;

pub use memory::InMemoryCacheStore;
pub use query_cache::QueryCache;
pub use result_cache::ResultCache;
pub use traits::{CacheEntry, CacheStats, CacheStore, CachedRows, EntryMetadata};
