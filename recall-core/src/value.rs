//! Runtime values and static types carried by predicate trees.

use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// STATIC TYPES
// ============================================================================

/// Static type of a predicate tree node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Bool,
    Int,
    Float,
    Str,
    Timestamp,
    Uuid,
    /// Nullable wrapper around a scalar type.
    Nullable(Box<TypeRef>),
    /// Entity or captured record type, by name.
    Entity(String),
    /// Finite, in-memory sequence.
    Sequence(Box<TypeRef>),
    /// Lazy sequence backed by the remote store. Never evaluated locally.
    Query(Box<TypeRef>),
    Any,
}

impl TypeRef {
    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity(name.into())
    }

    pub fn sequence_of(element: TypeRef) -> Self {
        Self::Sequence(Box::new(element))
    }

    pub fn query_of(element: TypeRef) -> Self {
        Self::Query(Box::new(element))
    }

    pub fn nullable(inner: TypeRef) -> Self {
        match inner {
            Self::Nullable(_) => inner,
            other => Self::Nullable(Box::new(other)),
        }
    }

    /// True for finite in-memory sequences.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence(_))
    }

    /// True for sequences whose elements live in the backing store.
    pub fn is_lazy_sequence(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Element type of either sequence kind.
    pub fn element(&self) -> Option<&TypeRef> {
        match self {
            Self::Sequence(inner) | Self::Query(inner) => Some(inner),
            _ => None,
        }
    }

    /// Strips one level of `Nullable`.
    pub fn underlying(&self) -> &TypeRef {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("Bool"),
            Self::Int => f.write_str("Int"),
            Self::Float => f.write_str("Float"),
            Self::Str => f.write_str("String"),
            Self::Timestamp => f.write_str("Timestamp"),
            Self::Uuid => f.write_str("Uuid"),
            Self::Nullable(inner) => write!(f, "Nullable<{}>", inner),
            Self::Entity(name) => f.write_str(name),
            Self::Sequence(inner) => write!(f, "List<{}>", inner),
            Self::Query(inner) => write!(f, "Query<{}>", inner),
            Self::Any => f.write_str("Any"),
        }
    }
}

// ============================================================================
// VALUES
// ============================================================================

/// A captured object: closure environment, constructed record or entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Runtime value held by constants and produced by the evaluator.
///
/// `List` and `Record` are shared behind `Arc`, so two captures of the same
/// content may or may not be the same allocation. Nothing downstream of
/// canonicalization depends on which.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    List(Arc<Vec<Value>>),
    Record(Arc<Record>),
    /// Pre-rendered canonical text, printed verbatim. Only produced by the
    /// collection canonicalizer; the evaluator refuses it.
    Canonical(String),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(Arc::new(items.into_iter().collect()))
    }

    pub fn record(record: Record) -> Self {
        Self::Record(Arc::new(record))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short runtime type name used in error messages.
    pub fn kind(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "Bool",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Str(_) => "String",
            Self::Timestamp(_) => "Timestamp",
            Self::Uuid(_) => "Uuid",
            Self::List(_) => "List",
            Self::Record(record) => record.type_name(),
            Self::Canonical(_) => "Canonical",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Equality with numeric widening between `Int` and `Float`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    /// Ordering for comparable scalar pairs. `None` when incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Str(a), Self::Str(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Content-based rendering used for sequence elements inside a
    /// canonical `{a|b|c}` constant. Nested lists and records render by
    /// content too, so identity never leaks into the key.
    pub fn canonical_text(&self) -> String {
        match self {
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::canonical_text).collect();
                format!("{{{}}}", parts.join("|"))
            }
            Self::Record(record) => {
                let parts: Vec<String> = record
                    .fields()
                    .map(|(name, value)| format!("{}={}", name, value.canonical_text()))
                    .collect();
                format!("{}{{{}}}", record.type_name(), parts.join(", "))
            }
            other => other.to_string(),
        }
    }
}

/// Literal rendering. Lists and records print by type only; use
/// [`Value::canonical_text`] for their contents.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Timestamp(ts) => {
                write!(f, "#{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Uuid(id) => write!(f, "uuid({})", id.hyphenated()),
            Self::List(_) => f.write_str("value(List)"),
            Self::Record(record) => write!(f, "value({})", record.type_name()),
            Self::Canonical(text) => f.write_str(text),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::record(record)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// JSON constants: objects become `object` records, arrays become lists.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::list(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                let record = map
                    .into_iter()
                    .fold(Record::new("object"), |record, (k, v)| {
                        record.with_field(k, Value::from(v))
                    });
                Self::record(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(Value::from("news").to_string(), "\"news\"");
        assert_eq!(Value::from(42i64).to_string(), "42");
        assert_eq!(Value::from(1.0).to_string(), "1.0");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::list(vec![1.into(), 2.into()]).to_string(), "value(List)");
    }

    #[test]
    fn test_canonical_text_is_content_based() {
        let a = Value::list(vec![Value::from("a"), Value::from(2)]);
        let b = Value::list(vec![Value::from("a"), Value::from(2)]);
        assert_eq!(a.canonical_text(), "{\"a\"|2}");
        assert_eq!(a.canonical_text(), b.canonical_text());

        let nested = Value::list(vec![a.clone(), Value::list(Vec::new())]);
        assert_eq!(nested.canonical_text(), "{{\"a\"|2}|{}}");
    }

    #[test]
    fn test_loose_eq_widens_numbers() {
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(!Value::Int(3).loose_eq(&Value::Str("3".into())));
        assert_eq!(Value::Int(1).compare(&Value::Float(1.5)), Some(Ordering::Less));
        assert_eq!(Value::Int(1).compare(&Value::Str("x".into())), None);
    }

    #[test]
    fn test_from_json() {
        let value = Value::from(json!({"tags": ["a", "b"], "score": 1.5, "n": 3}));
        let Value::Record(record) = value else {
            panic!("expected record");
        };
        assert_eq!(record.type_name(), "object");
        assert_eq!(record.field("n"), Some(&Value::Int(3)));
        assert_eq!(
            record.field("tags").map(Value::canonical_text),
            Some("{\"a\"|\"b\"}".to_string())
        );
    }

    #[test]
    fn test_type_display() {
        assert_eq!(TypeRef::sequence_of(TypeRef::Int).to_string(), "List<Int>");
        assert_eq!(TypeRef::query_of(TypeRef::entity("Tag")).to_string(), "Query<Tag>");
        assert_eq!(TypeRef::nullable(TypeRef::nullable(TypeRef::Int)).to_string(), "Nullable<Int>");
    }
}
