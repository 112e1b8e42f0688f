//! Name-to-value binding sources consulted during evaluation.
//!
//! A [`VariableResolver`] is anything that answers `find(name)`. The
//! [`Activation`] type covers the common shapes: empty, a single binding, a
//! lazily-computed binding, a map of bindings, a struct adapted into
//! bindings, and hierarchical extension where an inner activation shadows an
//! outer one. Comprehension-scope variables never reach the resolver; they
//! live in the evaluator's internal scope stack.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use ahash::AHashMap;

use crate::{types::StructValue, value::Value};

/// A name-to-value binding source.
///
/// Implementations must be cheap to query; `find` is called once per
/// identifier occurrence (per evaluation) outside comprehension scopes.
pub trait VariableResolver: fmt::Debug + Send + Sync {
    /// Resolves a variable by name.
    fn find(&self, name: &str) -> Option<Value>;
}

/// Ready-made [`VariableResolver`] implementations.
pub struct Activation {
    kind: ActivationKind,
}

enum ActivationKind {
    Empty,
    Single {
        name: Arc<str>,
        value: Value,
    },
    /// A binding whose value is computed on first lookup and cached.
    Lazy {
        name: Arc<str>,
        cell: OnceLock<Value>,
        init: Box<dyn Fn() -> Value + Send + Sync>,
    },
    Map(AHashMap<String, Value>),
    Struct(Arc<dyn StructValue>),
    /// Inner shadows outer.
    Extend {
        outer: Box<Activation>,
        inner: Box<Activation>,
    },
}

impl Activation {
    /// An activation that resolves nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: ActivationKind::Empty,
        }
    }

    /// Binds a single name to a value.
    #[must_use]
    pub fn bind(name: impl Into<Arc<str>>, value: Value) -> Self {
        Self {
            kind: ActivationKind::Single {
                name: name.into(),
                value,
            },
        }
    }

    /// Binds a single name to a value computed on first lookup.
    ///
    /// The computation runs at most once; subsequent lookups return the
    /// cached value.
    #[must_use]
    pub fn bind_lazy(name: impl Into<Arc<str>>, init: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            kind: ActivationKind::Lazy {
                name: name.into(),
                cell: OnceLock::new(),
                init: Box::new(init),
            },
        }
    }

    /// Builds an activation from name/value pairs.
    ///
    /// Entries whose value is `null` are skipped: a null-valued entry is
    /// treated as absent, so lookups fall through to an outer activation
    /// (or surface as an unknown) instead of binding the CEL `null` value.
    /// Later pairs with a repeated name win.
    #[must_use]
    pub fn from_map(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            kind: ActivationKind::Map(
                entries
                    .into_iter()
                    .filter(|(_, value)| !matches!(value, Value::Null))
                    .collect(),
            ),
        }
    }

    /// Adapts a struct value into bindings: each field becomes a variable.
    #[must_use]
    pub fn from_struct(value: Arc<dyn StructValue>) -> Self {
        Self {
            kind: ActivationKind::Struct(value),
        }
    }

    /// Layers `inner` over `outer`; inner bindings shadow outer ones.
    #[must_use]
    pub fn extend(outer: Self, inner: Self) -> Self {
        Self {
            kind: ActivationKind::Extend {
                outer: Box::new(outer),
                inner: Box::new(inner),
            },
        }
    }
}

impl VariableResolver for Activation {
    fn find(&self, name: &str) -> Option<Value> {
        match &self.kind {
            ActivationKind::Empty => None,
            ActivationKind::Single { name: bound, value } => (bound.as_ref() == name).then(|| value.clone()),
            ActivationKind::Lazy { name: bound, cell, init } => {
                (bound.as_ref() == name).then(|| cell.get_or_init(|| init()).clone())
            }
            ActivationKind::Map(entries) => entries.get(name).cloned(),
            ActivationKind::Struct(value) => value.field(name),
            ActivationKind::Extend { outer, inner } => inner.find(name).or_else(|| outer.find(name)),
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActivationKind::Empty => f.write_str("Activation::Empty"),
            ActivationKind::Single { name, value } => f
                .debug_struct("Activation::Single")
                .field("name", name)
                .field("value", value)
                .finish(),
            ActivationKind::Lazy { name, cell, .. } => f
                .debug_struct("Activation::Lazy")
                .field("name", name)
                .field("computed", &cell.get().is_some())
                .finish_non_exhaustive(),
            ActivationKind::Map(entries) => f.debug_tuple("Activation::Map").field(entries).finish(),
            ActivationKind::Struct(value) => f.debug_tuple("Activation::Struct").field(value).finish(),
            ActivationKind::Extend { outer, inner } => f
                .debug_struct("Activation::Extend")
                .field("outer", outer)
                .field("inner", inner)
                .finish(),
        }
    }
}
