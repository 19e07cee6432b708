//! Entity type identity used in cache keys.

use std::fmt;

/// Names of an entity type: the short name substituted for bound
/// parameters, and the fully qualified name hashed for unfiltered queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityName {
    name: String,
    qualified_name: String,
}

impl EntityName {
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
        }
    }

    /// An entity whose qualified name is its short name.
    pub fn simple(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            qualified_name: name.clone(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

/// Marker trait for row types whose query results can be cached.
///
/// `entity_name()` must return the same value for every call.
pub trait Entity: Send + Sync + 'static {
    fn entity_name() -> EntityName;
}
