//! The checked-AST contract consumed by the evaluator.
//!
//! Parsing and type checking are external: a front end hands the runtime a
//! [`CheckedAst`] — an expression tree with stable ids, a reference map
//! (per-call overload candidates and resolved identifier names), and source
//! info for error anchoring. The [`AstBuilder`] assigns ids and is how front
//! ends and tests assemble trees; no surface syntax exists in this crate.

use std::fmt::{self, Display};

use ahash::AHashMap;
use chrono::{DateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{
    error::EvalError,
    value::{Value, MAX_DURATION_SECONDS},
};

/// Well-known operator function names used in call expressions.
///
/// The parser lowers operators to calls of these functions; the driver
/// special-cases the short-circuiting ones and dispatches the rest through
/// the standard overload registry.
pub mod ops {
    pub const ADD: &str = "_+_";
    pub const SUBTRACT: &str = "_-_";
    pub const MULTIPLY: &str = "_*_";
    pub const DIVIDE: &str = "_/_";
    pub const MODULO: &str = "_%_";
    pub const NEGATE: &str = "-_";
    pub const LOGICAL_AND: &str = "_&&_";
    pub const LOGICAL_OR: &str = "_||_";
    pub const LOGICAL_NOT: &str = "!_";
    pub const CONDITIONAL: &str = "_?_:_";
    pub const EQUALS: &str = "_==_";
    pub const NOT_EQUALS: &str = "_!=_";
    pub const LESS: &str = "_<_";
    pub const LESS_EQUALS: &str = "_<=_";
    pub const GREATER: &str = "_>_";
    pub const GREATER_EQUALS: &str = "_>=_";
    pub const INDEX: &str = "_[_]";
    pub const IN: &str = "@in";
    pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
}

/// Stable identifier of an expression node within one AST.
///
/// Ids anchor reference-map entries, source offsets, error locations, and
/// legacy expression-id unknowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(u64);

impl ExprId {
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A literal constant embedded in the AST.
///
/// Durations and timestamps are stored as seconds + nanos rather than as
/// runtime values so the AST stays plain serializable data; conversion (and
/// range checking) happens at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Duration { seconds: i64, nanos: u32 },
    Timestamp { seconds: i64, nanos: u32 },
}

impl Constant {
    /// Converts the constant to its runtime value.
    ///
    /// Range violations (a checker should have rejected them, but the AST is
    /// host-supplied data) surface as error carriers, not panics.
    #[must_use]
    pub(crate) fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Uint(u) => Value::Uint(*u),
            Self::Double(d) => Value::Double(*d),
            Self::String(s) => Value::string(s.as_str()),
            Self::Bytes(b) => Value::bytes(b.as_slice()),
            Self::Duration { seconds, nanos } => {
                if seconds.abs() > MAX_DURATION_SECONDS {
                    return Value::error(EvalError::overflow("duration"));
                }
                match TimeDelta::new(*seconds, *nanos) {
                    Some(delta) => Value::Duration(delta),
                    None => Value::error(EvalError::overflow("duration")),
                }
            }
            Self::Timestamp { seconds, nanos } => match DateTime::from_timestamp(*seconds, *nanos) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::error(EvalError::invalid_argument("timestamp out of range")),
            },
        }
    }
}

/// One `key: value` entry in a map literal, preserving source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntryExpr {
    pub key: Expr,
    pub value: Expr,
}

/// One `field: value` entry in a struct literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructFieldExpr {
    pub field: String,
    pub value: Expr,
}

/// An expression node: a stable id plus the node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

/// The expression kinds the driver evaluates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Constant(Constant),
    /// A simple or (pre-resolved) qualified identifier.
    Ident { name: String },
    /// Field selection `operand.field`, or presence test `has(operand.field)`
    /// when `test_only` is set.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
    },
    /// A function call. Member calls (`target.f(args)`) carry the receiver,
    /// which dispatch folds in as the first argument.
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
    },
    Map {
        entries: Vec<MapEntryExpr>,
    },
    Struct {
        type_name: String,
        fields: Vec<StructFieldExpr>,
    },
    /// The CEL loop construct: fold `iter_range` into `accu_var`.
    ///
    /// `loop_condition` is evaluated before each step under
    /// `@not_strictly_false` semantics; a strictly-false condition stops the
    /// loop early. `result` is evaluated in the loop's scope afterwards.
    Comprehension {
        iter_var: String,
        iter_range: Box<Expr>,
        accu_var: String,
        accu_init: Box<Expr>,
        loop_condition: Box<Expr>,
        loop_step: Box<Expr>,
        result: Box<Expr>,
    },
}

/// A checker annotation for one expression: the resolved name of an
/// identifier and/or the candidate overload ids of a call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    pub name: Option<String>,
    pub overload_ids: Vec<String>,
}

/// Map from expression id to checker annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceMap {
    entries: AHashMap<ExprId, Reference>,
}

impl ReferenceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ExprId, reference: Reference) {
        self.entries.insert(id, reference);
    }

    #[must_use]
    pub fn get(&self, id: ExprId) -> Option<&Reference> {
        self.entries.get(&id)
    }
}

/// Source metadata: a description (file name or snippet label) and byte
/// offsets per expression id, used only for error message anchoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    description: Option<String>,
    offsets: AHashMap<ExprId, u32>,
}

impl SourceInfo {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            offsets: AHashMap::new(),
        }
    }

    pub fn set_offset(&mut self, id: ExprId, offset: u32) {
        self.offsets.insert(id, offset);
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn offset(&self, id: ExprId) -> Option<u32> {
        self.offsets.get(&id).copied()
    }
}

/// A type-checked AST ready for planning into a `Program`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckedAst {
    pub root: Expr,
    pub references: ReferenceMap,
    pub source_info: SourceInfo,
}

impl CheckedAst {
    /// Wraps a bare expression tree with empty annotations.
    #[must_use]
    pub fn new(root: Expr) -> Self {
        Self {
            root,
            references: ReferenceMap::new(),
            source_info: SourceInfo::default(),
        }
    }

    /// Serializes the AST to a binary format.
    ///
    /// The serialized data can be stored and later restored with `load()`,
    /// which allows caching checked expressions across processes.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes an AST from the binary format produced by `dump()`.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Assigns expression ids and collects annotations while assembling an AST.
///
/// Ids are assigned in construction order starting at 1. The builder is the
/// supported way to create [`CheckedAst`] values by hand; a real front end
/// would carry its checker's ids through the same surface.
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u64,
    references: ReferenceMap,
    source_info: SourceInfo,
}

impl AstBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> ExprId {
        self.next_id += 1;
        ExprId::new(self.next_id)
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr { id: self.next(), kind }
    }

    pub fn null(&mut self) -> Expr {
        self.expr(ExprKind::Constant(Constant::Null))
    }

    pub fn boolean(&mut self, v: bool) -> Expr {
        self.expr(ExprKind::Constant(Constant::Bool(v)))
    }

    pub fn int(&mut self, v: i64) -> Expr {
        self.expr(ExprKind::Constant(Constant::Int(v)))
    }

    pub fn uint(&mut self, v: u64) -> Expr {
        self.expr(ExprKind::Constant(Constant::Uint(v)))
    }

    pub fn double(&mut self, v: f64) -> Expr {
        self.expr(ExprKind::Constant(Constant::Double(v)))
    }

    pub fn string(&mut self, v: impl Into<String>) -> Expr {
        self.expr(ExprKind::Constant(Constant::String(v.into())))
    }

    pub fn bytes(&mut self, v: impl Into<Vec<u8>>) -> Expr {
        self.expr(ExprKind::Constant(Constant::Bytes(v.into())))
    }

    pub fn duration(&mut self, seconds: i64, nanos: u32) -> Expr {
        self.expr(ExprKind::Constant(Constant::Duration { seconds, nanos }))
    }

    pub fn timestamp(&mut self, seconds: i64, nanos: u32) -> Expr {
        self.expr(ExprKind::Constant(Constant::Timestamp { seconds, nanos }))
    }

    pub fn ident(&mut self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Ident { name: name.into() })
    }

    pub fn select(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::Select {
            operand: Box::new(operand),
            field: field.into(),
            test_only: false,
        })
    }

    /// A presence test: `has(operand.field)`.
    pub fn test(&mut self, operand: Expr, field: impl Into<String>) -> Expr {
        self.expr(ExprKind::Select {
            operand: Box::new(operand),
            field: field.into(),
            test_only: true,
        })
    }

    pub fn global_call(&mut self, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            target: None,
            function: function.into(),
            args,
        })
    }

    pub fn member_call(&mut self, target: Expr, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            target: Some(Box::new(target)),
            function: function.into(),
            args,
        })
    }

    pub fn list(&mut self, elements: Vec<Expr>) -> Expr {
        self.expr(ExprKind::List { elements })
    }

    pub fn map(&mut self, entries: Vec<(Expr, Expr)>) -> Expr {
        self.expr(ExprKind::Map {
            entries: entries
                .into_iter()
                .map(|(key, value)| MapEntryExpr { key, value })
                .collect(),
        })
    }

    pub fn struct_(&mut self, type_name: impl Into<String>, fields: Vec<(String, Expr)>) -> Expr {
        self.expr(ExprKind::Struct {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(field, value)| StructFieldExpr { field, value })
                .collect(),
        })
    }

    #[expect(clippy::too_many_arguments, reason = "mirrors the comprehension node's seven parts")]
    pub fn comprehension(
        &mut self,
        iter_var: impl Into<String>,
        iter_range: Expr,
        accu_var: impl Into<String>,
        accu_init: Expr,
        loop_condition: Expr,
        loop_step: Expr,
        result: Expr,
    ) -> Expr {
        self.expr(ExprKind::Comprehension {
            iter_var: iter_var.into(),
            iter_range: Box::new(iter_range),
            accu_var: accu_var.into(),
            accu_init: Box::new(accu_init),
            loop_condition: Box::new(loop_condition),
            loop_step: Box::new(loop_step),
            result: Box::new(result),
        })
    }

    /// Records candidate overload ids for a call expression, as a checker's
    /// reference map would.
    pub fn set_candidates(&mut self, id: ExprId, overload_ids: impl IntoIterator<Item = impl Into<String>>) {
        self.references.insert(
            id,
            Reference {
                name: None,
                overload_ids: overload_ids.into_iter().map(Into::into).collect(),
            },
        );
    }

    /// Records the source description used in error messages.
    pub fn set_source(&mut self, description: impl Into<String>) {
        self.source_info = SourceInfo::new(description);
    }

    /// Records the byte offset of an expression for error anchoring.
    pub fn set_offset(&mut self, id: ExprId, offset: u32) {
        self.source_info.set_offset(id, offset);
    }

    /// Finishes the AST with the given root expression.
    #[must_use]
    pub fn build(self, root: Expr) -> CheckedAst {
        CheckedAst {
            root,
            references: self.references,
            source_info: self.source_info,
        }
    }
}
