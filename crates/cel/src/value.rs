//! Runtime values and the static type tags used for overload dispatch.
//!
//! A [`Value`] is pure data with no pointers back into the AST or the
//! registry: it can be cloned cheaply (aggregates are reference-counted)
//! and compared structurally. [`Type`] is the parallel *static* model used
//! by the type checker and the function/operator registry; `Type::Dyn` has
//! no runtime counterpart — a value's runtime tag is always concrete.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Wrapper distinguishing `uint` from `int` for overload dispatch.
///
/// CEL treats `uint` as a tag distinct from `int`, even though both are
/// 64-bit integers under the hood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uint(pub u64);

impl fmt::Display for Uint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}u", self.0)
    }
}

/// `google.protobuf.Duration`: a signed (seconds, nanos) pair.
///
/// `nanos` is normalized to share the sign of `seconds` (or be zero) and to
/// stay within `(-999_999_999..=999_999_999)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CelDuration {
    pub seconds: i64,
    pub nanos: i32,
}

impl CelDuration {
    pub const ZERO: CelDuration = CelDuration {
        seconds: 0,
        nanos: 0,
    };

    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }.normalized()
    }

    fn normalized(self) -> Self {
        let total_nanos = self.seconds as i128 * 1_000_000_000 + self.nanos as i128;
        let seconds = (total_nanos / 1_000_000_000) as i64;
        let nanos = (total_nanos % 1_000_000_000) as i32;
        CelDuration { seconds, nanos }
    }

    /// Total magnitude in nanoseconds, used for overflow-checked arithmetic.
    fn total_nanos(self) -> i128 {
        self.seconds as i128 * 1_000_000_000 + self.nanos as i128
    }

    fn from_total_nanos(total: i128) -> Option<Self> {
        if total > i64::MAX as i128 * 1_000_000_000 || total < i64::MIN as i128 * 1_000_000_000 {
            None
        } else {
            let seconds = (total / 1_000_000_000) as i64;
            let nanos = (total % 1_000_000_000) as i32;
            Some(CelDuration { seconds, nanos })
        }
    }

    pub fn checked_add(self, other: CelDuration) -> Option<Self> {
        Self::from_total_nanos(self.total_nanos() + other.total_nanos())
    }

    pub fn checked_sub(self, other: CelDuration) -> Option<Self> {
        Self::from_total_nanos(self.total_nanos() - other.total_nanos())
    }

    pub fn to_chrono(self) -> chrono::Duration {
        chrono::Duration::seconds(self.seconds) + chrono::Duration::nanoseconds(self.nanos as i64)
    }
}

impl fmt::Display for CelDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.seconds as f64 + self.nanos as f64 / 1_000_000_000.0;
        write!(f, "{total}s")
    }
}

/// `google.protobuf.Timestamp`: an instant with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CelTimestamp(pub DateTime<Utc>);

impl fmt::Display for CelTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// Hashable subset of [`Value`] usable as a map key.
///
/// CEL restricts map keys to `string`, `int`, `uint` and `bool` (§3.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    String(Arc<str>),
    Int(i64),
    Uint(Uint),
    Bool(bool),
}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MapKey::String(s) => s.hash(state),
            MapKey::Int(n) => n.hash(state),
            MapKey::Uint(n) => n.hash(state),
            MapKey::Bool(b) => b.hash(state),
        }
    }
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::String(s) => Some(MapKey::String(s.clone())),
            Value::Int(n) => Some(MapKey::Int(*n)),
            Value::Uint(n) => Some(MapKey::Uint(*n)),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::String(s) => Value::String(s.clone()),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Uint(n) => Value::Uint(*n),
            MapKey::Bool(b) => Value::Bool(*b),
        }
    }
}

/// An insertion-ordered CEL map (§4.7: macro iteration over keys preserves
/// the order they were inserted).
pub type CelMap = indexmap::IndexMap<MapKey, Value>;

/// A runtime CEL value.
///
/// Aggregates (`list`, `map`, `string`, `bytes`) are `Arc`-backed so that
/// cloning a [`Value`] — which the evaluator does constantly when binding
/// macro iteration variables and threading arguments — is O(1).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(Uint),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<Vec<Value>>),
    Map(Arc<CelMap>),
    Timestamp(CelTimestamp),
    Duration(CelDuration),
    /// First-class reflection of a type tag (the result of the `type()`
    /// function, or of comparing a value's type to a declared one).
    Type(Type),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(items))
    }

    pub fn map(map: CelMap) -> Value {
        Value::Map(Arc::new(map))
    }

    /// The concrete runtime type tag, used for overload dispatch.
    pub fn type_tag(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::List(_) => Type::List(Box::new(Type::Dyn)),
            Value::Map(_) => Type::Map(Box::new(Type::Dyn), Box::new(Type::Dyn)),
            Value::Timestamp(_) => Type::Timestamp,
            Value::Duration(_) => Type::Duration,
            Value::Type(_) => Type::TypeType,
        }
    }

    pub fn is_truthy_bool(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Structural equality used by `==`/`!=` for values that share a
    /// runtime tag (cross-tag numeric equality is handled separately by
    /// the `==` operator overloads in `stdlib::equality`).
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| v.structural_eq(bv)))
            }
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }

    /// Number of Unicode code points for `string`, bytes for `bytes`,
    /// elements for `list`, entries for `map`. Used by the `size()`
    /// builtin (§3.1: "size() counts code points, not bytes").
    pub fn size(&self) -> Option<i64> {
        match self {
            Value::String(s) => Some(s.chars().count() as i64),
            Value::Bytes(b) => Some(b.len() as i64),
            Value::List(l) => Some(l.len() as i64),
            Value::Map(m) => Some(m.len() as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Uint(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b\"{}\"", String::from_utf8_lossy(b)),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {v}", k.to_value())?;
                }
                write!(f, "}}")
            }
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::Type(t) => write!(f, "type({t})"),
        }
    }
}

/// A stable hash of a value's *display* form, used only for test fixtures
/// that want a quick fingerprint; not used by map-key hashing.
pub fn debug_fingerprint(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Static type, used by the type checker, the registry's signature DSL,
/// and `Value::Type` reflection. `Dyn` is a compile-time-only marker: no
/// runtime value ever reports `Dyn` as its tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Timestamp,
    Duration,
    /// The type of a `Value::Type(_)` value itself.
    TypeType,
    /// A user-registered named type with a field schema (§3.3).
    Named(String),
    /// The static "unknown type" marker (§3.1, §4.4).
    Dyn,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Uint => write!(f, "uint"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Bytes => write!(f, "bytes"),
            Type::List(elem) => write!(f, "list<{elem}>"),
            Type::Map(k, v) => write!(f, "map<{k}, {v}>"),
            Type::Timestamp => write!(f, "google.protobuf.Timestamp"),
            Type::Duration => write!(f, "google.protobuf.Duration"),
            Type::TypeType => write!(f, "type"),
            Type::Named(name) => write!(f, "{name}"),
            Type::Dyn => write!(f, "dyn"),
        }
    }
}

impl Type {
    /// True for the three runtime tags that can appear on either side of a
    /// numeric cross-type equality comparison (§4.6).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Double)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_eq_requires_matching_tag() {
        assert!(!Value::Int(1).structural_eq(&Value::Uint(Uint(1))));
        assert!(Value::Int(1).structural_eq(&Value::Int(1)));
    }

    #[test]
    fn size_counts_code_points_not_bytes() {
        // "é" is two UTF-8 bytes but one code point.
        let v = Value::string("é");
        assert_eq!(v.size(), Some(1));
    }

    #[test]
    fn duration_add_normalizes_nanos() {
        let a = CelDuration::new(1, 800_000_000);
        let b = CelDuration::new(0, 800_000_000);
        let sum = a.checked_add(b).unwrap();
        assert_eq!(sum, CelDuration::new(2, 600_000_000));
    }

    #[test]
    fn uint_displays_with_suffix() {
        assert_eq!(Uint(7).to_string(), "7u");
    }

    #[test]
    fn map_iteration_preserves_insertion_order() {
        let mut m = CelMap::new();
        m.insert(MapKey::String("b".into()), Value::Int(1));
        m.insert(MapKey::String("a".into()), Value::Int(2));
        let keys: Vec<_> = m.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                MapKey::String("b".into()),
                MapKey::String("a".into())
            ]
        );
    }
}
