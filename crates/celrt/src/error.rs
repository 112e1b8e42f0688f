use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::ExprId;

/// Result type alias for operations that can produce an evaluation error.
pub type EvalResult<T> = Result<T, EvalError>;

/// The closed set of evaluation error categories.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly
/// (e.g., `NoSuchOverload` -> "NoSuchOverload").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Identifier or key lookup failure, including missing struct fields.
    NoSuchAttribute,
    /// No registered overload accepted the call's runtime argument types.
    NoSuchOverload,
    /// More than one registered overload accepted the call's arguments.
    AmbiguousOverload,
    /// Argument type check failure at dispatch, or an operation applied to a
    /// value kind it does not support.
    TypeMismatch,
    /// List index outside `0..len`.
    IndexOutOfBounds,
    /// Integer or unsigned division/modulo by zero.
    DivideByZero,
    /// Arithmetic overflow, duration/timestamp range violation, or a
    /// resource-limit overflow (e.g. the unknown-set cap).
    Overflow,
    /// Malformed input such as an invalid regex, a non-integral list index,
    /// or a repeated map-literal key.
    InvalidArgument,
    /// Invariant breach inside the evaluator.
    Internal,
}

/// An evaluation failure with a category, message, and optional source anchor.
///
/// Inside the evaluator errors travel as ordinary `Value::Error` carriers and
/// obey the tri-valued propagation rules; they are only converted into `Err`
/// at the `Program` boundary. The expression id is attached by the driver at
/// the failing node and preserved through propagation, so the boundary can map
/// it to a byte offset via the AST's source info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalError {
    kind: ErrorKind,
    message: String,
    expr_id: Option<ExprId>,
    /// Source description and byte offset, resolved at the program boundary.
    location: Option<(String, u32)>,
}

impl EvalError {
    /// Creates an error with the given kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expr_id: None,
            location: None,
        }
    }

    /// The error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable detail message, without the `evaluation error` prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The id of the expression that produced this error, if the driver
    /// attached one.
    #[must_use]
    pub fn expr_id(&self) -> Option<ExprId> {
        self.expr_id
    }

    /// Attaches the failing expression id unless one is already present.
    ///
    /// First-attach-wins keeps the innermost failing expression as the anchor
    /// while the error propagates outward through enclosing nodes.
    #[must_use]
    pub(crate) fn with_expr_id(mut self, id: ExprId) -> Self {
        if self.expr_id.is_none() {
            self.expr_id = Some(id);
        }
        self
    }

    /// Attaches a source description and byte offset for display.
    #[must_use]
    pub(crate) fn with_location(mut self, source: String, offset: u32) -> Self {
        self.location = Some((source, offset));
        self
    }

    pub(crate) fn no_such_attribute(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchAttribute, message)
    }

    pub(crate) fn no_such_key(key: &impl Display) -> Self {
        Self::new(ErrorKind::NoSuchAttribute, format!("no such key: {key}"))
    }

    pub(crate) fn no_such_overload(function: &str, arg_kinds: &str) -> Self {
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("found no matching overload for '{function}' applied to ({arg_kinds})"),
        )
    }

    pub(crate) fn ambiguous_overload(function: &str, candidates: &[&str]) -> Self {
        Self::new(
            ErrorKind::AmbiguousOverload,
            format!("ambiguous overloads for '{function}': [{}]", candidates.join(", ")),
        )
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub(crate) fn index_out_of_bounds(index: i64, len: usize) -> Self {
        Self::new(
            ErrorKind::IndexOutOfBounds,
            format!("index {index} out of bounds for list of size {len}"),
        )
    }

    pub(crate) fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "divide by zero")
    }

    pub(crate) fn modulus_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "modulus by zero")
    }

    pub(crate) fn overflow(operation: &str) -> Self {
        Self::new(ErrorKind::Overflow, format!("{operation} overflow"))
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Display for EvalError {
    /// Formats as `evaluation error[ at <source>:<offset>]: <detail>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some((source, offset)) => {
                write!(f, "evaluation error at {source}:{offset}: {}", self.message)
            }
            None => write!(f, "evaluation error: {}", self.message),
        }
    }
}

impl std::error::Error for EvalError {}
