//! RECALL Core - Predicate Trees and Cache Keys
//!
//! Typed filter expressions over entities, a partial evaluator that folds
//! captured values into constants, and the deterministic fingerprint that
//! turns a query into a namespaced cache key. No storage lives here.

pub mod canonicalize;
pub mod config;
pub mod entity;
pub mod error;
pub mod eval;
pub mod fingerprint;
pub mod include;
pub mod interpret;
pub mod print;
pub mod tree;
pub mod value;

pub use canonicalize::{canonicalize, canonicalize_predicate};
pub use config::{
    CachePriority, CacheSettings, TtlPolicy, DEFAULT_PURGE_INTERVAL_SECS, DEFAULT_SLIDING_TTL_SECS,
};
pub use entity::{Entity, EntityName};
pub use error::{
    CacheBackendError, ConfigError, EvaluationError, IncludePathError, RecallError, RecallResult,
};
pub use eval::{default_eligibility, fold, fold_predicate};
pub use fingerprint::{cache_key, canonical_form, CacheKey, CACHE_KEY_PREFIX};
pub use include::IncludePath;
pub use interpret::evaluate;
pub use print::{print_expr, print_lambda, ParameterNaming, Printer};
pub use tree::{BinaryOp, Expr, Lambda, Method, Parameter, Predicate, UnaryOp};
pub use value::{Record, TypeRef, Value};
