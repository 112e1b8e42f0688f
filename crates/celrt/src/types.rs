//! Runtime type descriptors and the provider seams for struct values.
//!
//! `type(x)` produces a first-class [`CelType`]; named struct types resolve
//! through an external [`TypeProvider`], and struct construction/selection
//! goes through a [`ValueProvider`]. The crate ships a dynamic provider pair
//! ([`DynProvider`] / [`DynStruct`]) that treats every struct as an open bag
//! of fields, which is what tests and schema-less hosts use; a protobuf
//! message layer would supply its own implementations of the same traits.

use std::{
    fmt::{self, Display},
    sync::Arc,
};

use ahash::RandomState;
use indexmap::IndexMap;

use crate::value::Value;

/// A first-class runtime type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
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
    Optional,
    /// The type of type values themselves: `type(type(1))` is `type`.
    Type,
    /// A named struct (message) type.
    Struct(Arc<str>),
}

impl Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null_type",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Duration => "duration",
            Self::Timestamp => "timestamp",
            Self::List => "list",
            Self::Map => "map",
            Self::Optional => "optional_type",
            Self::Type => "type",
            Self::Struct(name) => name,
        };
        f.write_str(name)
    }
}

/// Looks up the builtin type literal for a name, e.g. `int` or `type`.
///
/// Consulted for identifiers the resolver does not bind, before the external
/// `TypeProvider` gets a chance to resolve struct type names.
#[must_use]
pub(crate) fn builtin_type(name: &str) -> Option<CelType> {
    let t = match name {
        "null_type" => CelType::Null,
        "bool" => CelType::Bool,
        "int" => CelType::Int,
        "uint" => CelType::Uint,
        "double" => CelType::Double,
        "string" => CelType::String,
        "bytes" => CelType::Bytes,
        "duration" => CelType::Duration,
        "timestamp" => CelType::Timestamp,
        "list" => CelType::List,
        "map" => CelType::Map,
        "optional_type" => CelType::Optional,
        "type" => CelType::Type,
        _ => return None,
    };
    Some(t)
}

/// Computes the runtime type of a concrete value.
///
/// `Error` and `Unknown` never reach this: `type` is a strict overload, so
/// the driver propagates them before dispatch. Returning `None` for those
/// kinds lets the caller surface an internal error instead of panicking.
#[must_use]
pub(crate) fn type_of(value: &Value) -> Option<CelType> {
    match value {
        Value::Null => Some(CelType::Null),
        Value::Bool(_) => Some(CelType::Bool),
        Value::Int(_) => Some(CelType::Int),
        Value::Uint(_) => Some(CelType::Uint),
        Value::Double(_) => Some(CelType::Double),
        Value::String(_) => Some(CelType::String),
        Value::Bytes(_) => Some(CelType::Bytes),
        Value::Duration(_) => Some(CelType::Duration),
        Value::Timestamp(_) => Some(CelType::Timestamp),
        Value::List(_) => Some(CelType::List),
        Value::Map(_) => Some(CelType::Map),
        Value::Struct(s) => Some(CelType::Struct(Arc::from(s.type_name()))),
        Value::Optional(_) => Some(CelType::Optional),
        Value::Type(_) => Some(CelType::Type),
        Value::Error(_) | Value::Unknown(_) => None,
    }
}

/// Resolves named types (structs, enums) for `type(x)` and for type-literal
/// references in a checked AST's reference map.
pub trait TypeProvider: fmt::Debug + Send + Sync {
    /// Looks up a type by its fully-qualified name.
    fn find_type(&self, name: &str) -> Option<CelType>;
}

/// Constructs and inspects struct (message) values.
///
/// The default `select`/`has` implementations delegate to the target's
/// [`StructValue`]; providers with their own field encoding override them.
pub trait ValueProvider: fmt::Debug + Send + Sync {
    /// Constructs a struct instance from a field map, or `None` when the
    /// type name is not constructible by this provider.
    fn new_value(&self, type_name: &str, fields: Vec<(Arc<str>, Value)>) -> Option<Value>;

    /// Selects a field from a struct value.
    fn select(&self, target: &dyn StructValue, field: &str) -> Option<Value> {
        target.field(field)
    }

    /// Tests field presence on a struct value.
    fn has(&self, target: &dyn StructValue, field: &str) -> bool {
        target.has_field(field)
    }
}

/// A named, field-addressable runtime value.
///
/// Implementations own their field storage; `field` returns owned values so
/// the trait stays object-safe and implementations can synthesize fields.
pub trait StructValue: fmt::Debug + Send + Sync {
    /// The fully-qualified type name.
    fn type_name(&self) -> &str;

    /// The value of a field, or `None` when the field is unset or unknown
    /// to the type.
    fn field(&self, name: &str) -> Option<Value>;

    /// Field presence test, used by `has()`.
    fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// All set field names, in a stable order.
    fn field_names(&self) -> Vec<Arc<str>>;
}

/// A schema-less struct: a type name plus an ordered bag of fields.
#[derive(Debug, Clone, Default)]
pub struct DynStruct {
    type_name: Arc<str>,
    fields: IndexMap<Arc<str>, Value, RandomState>,
}

impl DynStruct {
    /// Builds a struct from a type name and field pairs. Later pairs with a
    /// repeated name overwrite earlier ones.
    #[must_use]
    pub fn new(type_name: impl Into<Arc<str>>, fields: impl IntoIterator<Item = (Arc<str>, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: fields.into_iter().collect(),
        }
    }
}

impl StructValue for DynStruct {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn field_names(&self) -> Vec<Arc<str>> {
        self.fields.keys().cloned().collect()
    }
}

/// Open-world provider backed by [`DynStruct`].
///
/// Resolves and constructs any type name it is asked about. Suitable for
/// tests and schema-less hosts; schema-aware hosts plug in their own
/// [`TypeProvider`] / [`ValueProvider`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynProvider;

impl TypeProvider for DynProvider {
    /// Construction is open-world but resolution is closed: claiming every
    /// name here would turn ordinary undefined identifiers into type values.
    fn find_type(&self, _name: &str) -> Option<CelType> {
        None
    }
}

impl ValueProvider for DynProvider {
    fn new_value(&self, type_name: &str, fields: Vec<(Arc<str>, Value)>) -> Option<Value> {
        Some(Value::Struct(Arc::new(DynStruct::new(type_name, fields))))
    }
}
