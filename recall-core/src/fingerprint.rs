//! Cache key generation.
//!
//! A key is `recall:query:` followed by the lowercase hex SHA-256 of the
//! canonical form of a query. The canonical form is the folded and
//! canonicalized predicate body printed with bound parameters renamed to the
//! entity type name, followed by each eager-load path in the order given.

use crate::canonicalize::canonicalize_predicate;
use crate::entity::EntityName;
use crate::error::RecallResult;
use crate::eval::fold_predicate;
use crate::include::IncludePath;
use crate::print::{ParameterNaming, Printer};
use crate::tree::Predicate;
use sha2::{Digest, Sha256};
use std::fmt;

/// Reserved prefix shared by every query cache key.
pub const CACHE_KEY_PREFIX: &str = "recall:query:";

/// A namespaced query cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps a raw key. Keys produced by [`cache_key`] always carry
    /// [`CACHE_KEY_PREFIX`]; raw keys are accepted as-is.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// The hex digest without the prefix.
    pub fn digest(&self) -> &str {
        self.0.strip_prefix(CACHE_KEY_PREFIX).unwrap_or(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The pre-hash text of a query. Useful when diagnosing unexpected misses.
pub fn canonical_form(
    predicate: Option<&Predicate>,
    entity: &EntityName,
    includes: &[IncludePath],
) -> RecallResult<String> {
    let mut text = match predicate {
        Some(predicate) => {
            let folded = fold_predicate(predicate)?;
            let canonical = canonicalize_predicate(&folded);
            Printer::new(ParameterNaming::Entity(entity.name())).print_body(&canonical)
        }
        None => entity.qualified_name().to_string(),
    };
    for include in includes {
        text.push_str(&include.to_string());
    }
    Ok(text)
}

/// Computes the cache key for a query over `entity`.
///
/// Fails only when a closed subtree of the predicate cannot be evaluated.
pub fn cache_key(
    predicate: Option<&Predicate>,
    entity: &EntityName,
    includes: &[IncludePath],
) -> RecallResult<CacheKey> {
    let text = canonical_form(predicate, entity, includes)?;
    Ok(key_for_text(&text))
}

fn key_for_text(text: &str) -> CacheKey {
    let digest = Sha256::digest(text.as_bytes());
    CacheKey(format!("{}{}", CACHE_KEY_PREFIX, hex::encode(digest)))
}

// =============================================================================
// TESTS
// =============================================================================
