use std::{
    cmp::Ordering,
    fmt::{self, Display},
    sync::Arc,
};

use ahash::RandomState;
use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use strum::{Display, IntoStaticStr};

use crate::{
    error::{EvalError, EvalResult},
    numeric::{self, CanonicalInt},
    types::{CelType, StructValue},
    unknown::UnknownSet,
};

/// Maximum magnitude of a duration in whole seconds: ±3,652,500 days.
pub(crate) const MAX_DURATION_SECONDS: i64 = 3_652_500 * 86_400;

/// Primary value type representing CEL values at runtime.
///
/// This enum keeps small values (numbers, bools, null) inline and shares
/// aggregate values (strings, lists, maps, structs) behind `Arc`, so cloning
/// a value is always cheap. All values are immutable once constructed; the
/// evaluator builds new aggregates instead of mutating.
///
/// `Error` and `Unknown` are first-class variants: inside the evaluator they
/// travel through the tri-valued algebra like any other value and are only
/// converted to `Err`/`UnknownSet` results at the `Program` boundary.
///
/// NOTE: `int` and `uint` are distinct kinds and never coerce at dispatch;
/// equality and ordering across `{int, uint, double}` compare the
/// mathematical values losslessly (see [`Value::equals`] and
/// [`Value::compare`]).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer, kept distinct from `Int`.
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    /// Signed duration, bounded to ±3,652,500 days on construction.
    Duration(TimeDelta),
    Timestamp(DateTime<Utc>),
    List(Arc<[Value]>),
    Map(Arc<MapValue>),
    /// Named, field-addressable value backed by a [`StructValue`] impl.
    Struct(Arc<dyn StructValue>),
    Optional(Arc<OptionalValue>),
    /// First-class type descriptor, as produced by `type(x)`.
    Type(CelType),
    /// An evaluation failure propagating through strict operations.
    Error(Box<EvalError>),
    /// Unresolved-input marker propagating through strict operations.
    Unknown(Arc<UnknownSet>),
}

impl Value {
    /// Wraps an error as a carrier value.
    #[must_use]
    pub fn error(err: EvalError) -> Self {
        Self::Error(Box::new(err))
    }

    /// Wraps a string slice.
    #[must_use]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Wraps a byte slice.
    #[must_use]
    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(b.into())
    }

    /// Wraps a list of values.
    #[must_use]
    pub fn list(items: impl Into<Arc<[Value]>>) -> Self {
        Self::List(items.into())
    }

    /// Wraps a duration, failing with `Overflow` outside ±3,652,500 days.
    pub fn duration(delta: TimeDelta) -> EvalResult<Self> {
        if delta.num_seconds().abs() > MAX_DURATION_SECONDS {
            Err(EvalError::overflow("duration"))
        } else {
            Ok(Self::Duration(delta))
        }
    }

    /// The runtime kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Null => Kind::Null,
            Self::Bool(_) => Kind::Bool,
            Self::Int(_) => Kind::Int,
            Self::Uint(_) => Kind::Uint,
            Self::Double(_) => Kind::Double,
            Self::String(_) => Kind::String,
            Self::Bytes(_) => Kind::Bytes,
            Self::Duration(_) => Kind::Duration,
            Self::Timestamp(_) => Kind::Timestamp,
            Self::List(_) => Kind::List,
            Self::Map(_) => Kind::Map,
            Self::Struct(_) => Kind::Struct,
            Self::Optional(_) => Kind::Optional,
            Self::Type(_) => Kind::Type,
            Self::Error(_) => Kind::Error,
            Self::Unknown(_) => Kind::Unknown,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }

    /// Equality under CEL semantics: homogeneous by kind, except that
    /// numbers compare by mathematical value with lossless conversion.
    ///
    /// NaN is unequal to everything including itself. `Error` and `Unknown`
    /// compare structurally; strict dispatch guarantees they never reach the
    /// `_==_` overload during evaluation, so this only matters for host-side
    /// comparisons.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Int(a), Self::Uint(b)) => numeric::cmp_int_uint(*a, *b) == Ordering::Equal,
            (Self::Uint(a), Self::Int(b)) => numeric::cmp_int_uint(*b, *a) == Ordering::Equal,
            (Self::Int(a), Self::Double(b)) => numeric::cmp_int_double(*a, *b) == Some(Ordering::Equal),
            (Self::Double(a), Self::Int(b)) => numeric::cmp_int_double(*b, *a) == Some(Ordering::Equal),
            (Self::Uint(a), Self::Double(b)) => numeric::cmp_uint_double(*a, *b) == Some(Ordering::Equal),
            (Self::Double(a), Self::Uint(b)) => numeric::cmp_uint_double(*b, *a) == Some(Ordering::Equal),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Self::Map(a), Self::Map(b)) => a.equals(b),
            (Self::Struct(a), Self::Struct(b)) => struct_equals(a.as_ref(), b.as_ref()),
            (Self::Optional(a), Self::Optional(b)) => match (a.value(), b.value()) {
                (Some(x), Some(y)) => x.equals(y),
                (None, None) => true,
                _ => false,
            },
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Unknown(a), Self::Unknown(b)) => a == b,
            _ => false,
        }
    }

    /// Ordering under CEL semantics.
    ///
    /// Defined for homogeneous comparisons of the ordered kinds and for the
    /// heterogeneous `{int, uint, double}` pairs (numerically lossless).
    /// Returns `None` for unordered kind pairs and for NaN operands.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Uint(a), Self::Uint(b)) => Some(a.cmp(b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Uint(b)) => Some(numeric::cmp_int_uint(*a, *b)),
            (Self::Uint(a), Self::Int(b)) => Some(numeric::cmp_int_uint(*b, *a).reverse()),
            (Self::Int(a), Self::Double(b)) => numeric::cmp_int_double(*a, *b),
            (Self::Double(a), Self::Int(b)) => numeric::cmp_int_double(*b, *a).map(Ordering::reverse),
            (Self::Uint(a), Self::Double(b)) => numeric::cmp_uint_double(*a, *b),
            (Self::Double(a), Self::Uint(b)) => numeric::cmp_uint_double(*b, *a).map(Ordering::reverse),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Duration(a), Self::Duration(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(Arc::from(v))
    }
}

fn struct_equals(a: &dyn StructValue, b: &dyn StructValue) -> bool {
    if a.type_name() != b.type_name() {
        return false;
    }
    let names = a.field_names();
    if names.len() != b.field_names().len() {
        return false;
    }
    names.iter().all(|name| match (a.field(name), b.field(name)) {
        (Some(x), Some(y)) => x.equals(&y),
        _ => false,
    })
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}u"),
            Self::Double(d) => write!(f, "{d:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b.iter() {
                    write!(f, "\\x{byte:02x}")?;
                }
                f.write_str("\"")
            }
            Self::Duration(d) => {
                let nanos = d.subsec_nanos();
                if nanos == 0 {
                    write!(f, "{}s", d.num_seconds())
                } else {
                    write!(f, "{}.{:09}s", d.num_seconds(), nanos.unsigned_abs())
                }
            }
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::List(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (idx, (key, value)) in map.entries().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Struct(s) => {
                write!(f, "{}{{", s.type_name())?;
                for (idx, name) in s.field_names().iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    match s.field(name) {
                        Some(value) => write!(f, "{name}: {value}")?,
                        None => write!(f, "{name}: <unset>")?,
                    }
                }
                f.write_str("}")
            }
            Self::Optional(o) => match o.value() {
                Some(v) => write!(f, "optional({v})"),
                None => f.write_str("optional.none()"),
            },
            Self::Type(t) => write!(f, "{t}"),
            Self::Error(e) => write!(f, "error({})", e.message()),
            Self::Unknown(u) => write!(f, "{u}"),
        }
    }
}

/// Runtime kind tags, one per [`Value`] variant.
///
/// Used for overload parameter matching and diagnostics; display names are
/// the lowercase CEL kind names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Kind {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    List,
    Map,
    Struct,
    Optional,
    Type,
    Error,
    Unknown,
}

/// A present-or-absent optional value.
///
/// Distinct from `null`: an absent optional carries no value at all, while
/// `null` is itself a value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OptionalValue(Option<Value>);

impl OptionalValue {
    /// An optional holding a value.
    #[must_use]
    pub fn of(value: Value) -> Self {
        Self(Some(value))
    }

    /// The absent optional.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// The contained value, if present.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref()
    }
}

/// Normalized map key.
///
/// All numeric keys share a canonical integer form so that `1`, `1u`, and
/// `1.0` address the same entry, which keeps map lookup consistent with CEL
/// numeric equality (and derived `Hash` consistent with `Eq`). Non-integral
/// and NaN doubles have no key form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapKey(KeyRepr);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyRepr {
    Bool(bool),
    Int(CanonicalInt),
    String(Arc<str>),
}

impl MapKey {
    /// Normalizes a value into its key form, or `None` for unkeyable values.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self(KeyRepr::Bool(*b))),
            Value::Int(i) => Some(Self(KeyRepr::Int(CanonicalInt::from_i64(*i)))),
            Value::Uint(u) => Some(Self(KeyRepr::Int(CanonicalInt::from_u64(*u)))),
            Value::Double(d) => CanonicalInt::from_f64(*d).map(|c| Self(KeyRepr::Int(c))),
            Value::String(s) => Some(Self(KeyRepr::String(s.clone()))),
            _ => None,
        }
    }
}

/// Insertion-ordered CEL map.
///
/// Entries remember the key value as originally written, so iteration and
/// display reproduce `{1u: "a"}` rather than its normalized form; lookup
/// always goes through the normalized [`MapKey`].
#[derive(Debug, Clone, Default)]
pub struct MapValue {
    entries: IndexMap<MapKey, (Value, Value), RandomState>,
}

impl MapValue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from key/value pairs, failing on unkeyable or repeated keys.
    pub fn from_entries(pairs: impl IntoIterator<Item = (Value, Value)>) -> EvalResult<Self> {
        let mut map = Self::new();
        for (key, value) in pairs {
            map.insert_unique(key, value)?;
        }
        Ok(map)
    }

    /// Inserts an entry, failing on unkeyable or already-present keys.
    pub fn insert_unique(&mut self, key: Value, value: Value) -> EvalResult<()> {
        let Some(map_key) = MapKey::from_value(&key) else {
            return Err(EvalError::invalid_argument(format!(
                "value of kind '{}' cannot be used as a map key",
                key.kind()
            )));
        };
        if self.entries.contains_key(&map_key) {
            return Err(EvalError::invalid_argument(format!("repeated map key: {key}")));
        }
        self.entries.insert(map_key, (key, value));
        Ok(())
    }

    /// Looks up a value by key with numeric normalization.
    ///
    /// A key that has no normalized form (e.g. `1.5`) is simply not present.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        let map_key = MapKey::from_value(key)?;
        self.entries.get(&map_key).map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries as `(original key, value)` pairs in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    /// Iterates the original key values in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(key, _)| key)
    }

    /// Map equality: same size and every left entry present in the right
    /// under normalized lookup with an equal value.
    #[must_use]
    pub fn equals(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(map_key, (_, value))| match other.entries.get(map_key) {
                    Some((_, other_value)) => value.equals(other_value),
                    None => false,
                })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_is_lossless() {
        assert_eq!(Value::Int(1), Value::Uint(1));
        assert_eq!(Value::Int(1), Value::Double(1.0));
        assert_eq!(Value::Uint(1), Value::Double(1.0));
        assert_ne!(Value::Double(1.5), Value::Int(1));
        assert_ne!(Value::Int(-1), Value::Uint(u64::MAX));
        // 2^63 exists in uint and double but not int.
        assert_eq!(Value::Uint(1 << 63), Value::Double(9_223_372_036_854_775_808.0));
        assert_ne!(Value::Double(f64::NAN), Value::Double(f64::NAN));
    }

    #[test]
    fn map_lookup_normalizes_numeric_keys() {
        let map = MapValue::from_entries([(Value::Uint(1), Value::from("a"))]).unwrap();
        assert_eq!(map.get(&Value::Int(1)), Some(&Value::from("a")));
        assert_eq!(map.get(&Value::Uint(1)), Some(&Value::from("a")));
        assert_eq!(map.get(&Value::Double(1.0)), Some(&Value::from("a")));
        assert_eq!(map.get(&Value::Double(1.5)), None);
        assert_eq!(map.get(&Value::Double(f64::NAN)), None);
    }

    #[test]
    fn map_literal_rejects_repeated_keys_across_kinds() {
        let err = MapValue::from_entries([
            (Value::Int(1), Value::from("a")),
            (Value::Double(1.0), Value::from("b")),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn duration_range_is_enforced() {
        assert!(Value::duration(TimeDelta::seconds(MAX_DURATION_SECONDS)).is_ok());
        assert!(Value::duration(TimeDelta::seconds(MAX_DURATION_SECONDS + 1)).is_err());
        assert!(Value::duration(TimeDelta::seconds(-MAX_DURATION_SECONDS - 1)).is_err());
    }
}
