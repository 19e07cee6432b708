//! RECALL Storage - Query Result Cache
//!
//! Stores materialized query results under fingerprint keys from
//! `recall-core` and clears them when a unit of work commits writes.

pub mod cache;
pub mod clock;
pub mod session;

pub use cache::{
    CacheEntry, CacheStats, CacheStore, CachedRows, EntryMetadata, InMemoryCacheStore, QueryCache,
    ResultCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use session::{QueryBackend, Session, WriteTracker};
