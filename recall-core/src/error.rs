//! Error types for RECALL operations

use thiserror::Error;

/// Errors raised while interpreting a closed subtree during partial folding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Null dereference accessing member `{member}`")]
    NullDereference { member: String },

    #[error("Division by zero in `{expression}`")]
    DivideByZero { expression: String },

    #[error("Arithmetic overflow in `{expression}`")]
    Overflow { expression: String },

    #[error("Type mismatch for {operation}: {detail}")]
    TypeMismatch { operation: String, detail: String },

    #[error("Unknown member `{member}` on {type_name}")]
    UnknownMember { type_name: String, member: String },

    #[error("Parameter `{name}` is not bound in a locally evaluable subtree")]
    UnboundParameter { name: String },

    #[error("Cannot evaluate {node} locally")]
    Unsupported { node: String },
}

/// Cache store failures. The cache is best-effort, so these are logged and
/// absorbed by the result cache rather than surfaced to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheBackendError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache entry for {key} is corrupted: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Cache store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Eager-load path resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IncludePathError {
    #[error("Include path must be a member chain over its parameter, got `{expression}`")]
    NotAMemberChain { expression: String },

    #[error("Include path lambda must bind exactly one parameter, got {count}")]
    ParameterCount { count: usize },

    #[error("Include path is empty")]
    Empty,
}

/// Master error type for all RECALL errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecallError {
    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Cache backend error: {0}")]
    CacheBackend(#[from] CacheBackendError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Include path error: {0}")]
    IncludePath(#[from] IncludePathError),
}

/// Result type alias for RECALL operations.
pub type RecallResult<T> = Result<T, RecallError>;

// =============================================================================
// TESTS
// =============================================================================
