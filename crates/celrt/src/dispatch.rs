//! The function dispatcher: overload registry, matching, and invocation.
//!
//! Bindings are registered into a mutable [`DispatcherBuilder`] during
//! program construction and frozen into an immutable [`Dispatcher`] that the
//! runtime shares across evaluations. Resolution prefers the checked AST's
//! candidate overload ids; calls without candidates fall back to dynamic
//! dispatch over every overload registered under the function name, where an
//! ambiguous match is an error rather than a registration-order accident.

use std::{fmt, sync::Arc};

use ahash::AHashMap;

use crate::{
    error::{EvalError, EvalResult},
    value::{Kind, Value},
};

/// Declared parameter type of an overload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    /// Matches any concrete value, including null.
    Any,
    /// Matches values of exactly this kind. `Kind::Struct` matches any
    /// struct; use [`ArgType::Struct`] to require a specific type name.
    Kind(Kind),
    /// Matches struct values with this fully-qualified type name.
    Struct(Arc<str>),
}

impl ArgType {
    /// Whether a concrete (non-error, non-unknown) value satisfies this
    /// parameter.
    ///
    /// Null is special-cased: it satisfies only `Any` and map-typed
    /// parameters, mirroring how dynamic hosts hand nulls to map-shaped
    /// signatures.
    fn matches(&self, value: &Value) -> bool {
        if matches!(value, Value::Null) {
            return matches!(self, Self::Any | Self::Kind(Kind::Map));
        }
        match self {
            Self::Any => true,
            Self::Kind(kind) => value.kind() == *kind,
            Self::Struct(name) => matches!(value, Value::Struct(s) if s.type_name() == name.as_ref()),
        }
    }
}

/// One typed implementation registered under an overload id (and optionally
/// a function name, making it addressable by dynamic dispatch).
///
/// Overloads are strict by default: the driver propagates error/unknown
/// arguments instead of invoking them. Non-strict overloads receive
/// error/unknown arguments verbatim and decide for themselves.
pub struct FunctionBinding {
    overload_id: Arc<str>,
    function: Option<Arc<str>>,
    arg_types: Vec<ArgType>,
    strict: bool,
    func: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl FunctionBinding {
    /// Creates a strict binding under an overload id.
    #[must_use]
    pub fn new(
        overload_id: impl Into<Arc<str>>,
        arg_types: Vec<ArgType>,
        func: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            overload_id: overload_id.into(),
            function: None,
            arg_types,
            strict: true,
            func: Arc::new(func),
        }
    }

    /// Additionally registers the binding under a function name for dynamic
    /// dispatch.
    #[must_use]
    pub fn with_function(mut self, function: impl Into<Arc<str>>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Marks the binding non-strict: it will be handed error and unknown
    /// arguments instead of having them propagated past it.
    #[must_use]
    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    #[must_use]
    pub fn overload_id(&self) -> &str {
        &self.overload_id
    }

    #[must_use]
    pub(crate) fn is_strict(&self) -> bool {
        self.strict
    }

    /// Whether this overload accepts the given runtime arguments.
    ///
    /// Arity must match; error/unknown arguments are admitted only by
    /// non-strict overloads; everything else goes through per-parameter
    /// type matching.
    pub(crate) fn can_handle(&self, args: &[Value]) -> bool {
        if args.len() != self.arg_types.len() {
            return false;
        }
        self.arg_types.iter().zip(args).all(|(ty, arg)| {
            if arg.is_error() || arg.is_unknown() {
                !self.strict
            } else {
                ty.matches(arg)
            }
        })
    }

    pub(crate) fn invoke(&self, args: &[Value]) -> Value {
        (self.func)(args)
    }
}

impl fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("overload_id", &self.overload_id)
            .field("function", &self.function)
            .field("arg_types", &self.arg_types)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// Mutable registry assembled during program construction.
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    by_overload: AHashMap<Arc<str>, Arc<FunctionBinding>>,
    by_function: AHashMap<Arc<str>, Vec<Arc<FunctionBinding>>>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binding. Overload ids must be unique.
    pub fn register(&mut self, binding: FunctionBinding) -> EvalResult<()> {
        if self.by_overload.contains_key(&binding.overload_id) {
            return Err(EvalError::invalid_argument(format!(
                "overload id '{}' registered twice",
                binding.overload_id
            )));
        }
        let binding = Arc::new(binding);
        if let Some(function) = &binding.function {
            self.by_function.entry(function.clone()).or_default().push(binding.clone());
        }
        self.by_overload.insert(binding.overload_id.clone(), binding);
        Ok(())
    }

    /// Freezes the registry into an immutable dispatch table.
    #[must_use]
    pub fn freeze(self) -> Dispatcher {
        Dispatcher {
            by_overload: self.by_overload,
            by_function: self.by_function,
        }
    }
}

/// Outcome of overload resolution against one dispatch table.
pub(crate) enum Resolution {
    /// Exactly one overload accepted the arguments.
    Overload(Arc<FunctionBinding>),
    /// No registered overload accepted the arguments.
    NoMatch,
    /// More than one overload accepted the arguments.
    Ambiguous(EvalError),
}

/// Immutable, frozen dispatch table.
///
/// Shared by reference across concurrent evaluations; a second `Dispatcher`
/// holding late-bound functions may be layered on per evaluation.
#[derive(Debug, Default)]
pub struct Dispatcher {
    by_overload: AHashMap<Arc<str>, Arc<FunctionBinding>>,
    by_function: AHashMap<Arc<str>, Vec<Arc<FunctionBinding>>>,
}

impl Dispatcher {
    /// Builds a dispatcher directly from bindings, without the builder
    /// round-trip. Used for late-bound function tables.
    pub fn from_bindings(bindings: impl IntoIterator<Item = FunctionBinding>) -> EvalResult<Self> {
        let mut builder = DispatcherBuilder::new();
        for binding in bindings {
            builder.register(binding)?;
        }
        Ok(builder.freeze())
    }

    /// Resolves a call to at most one overload.
    ///
    /// With candidate ids (from the checked AST's reference map), only those
    /// overloads are considered; ids not present in this table are skipped,
    /// since they may refer to functions in another (late-bound) table. With
    /// no candidates, every overload registered under the function name is
    /// considered. Either way, more than one handling overload is an
    /// ambiguity error, never a silent pick.
    pub(crate) fn resolve(&self, function: &str, candidate_ids: &[String], args: &[Value]) -> Resolution {
        let mut matched: Option<&Arc<FunctionBinding>> = None;
        let mut ambiguous: Vec<&str> = Vec::new();

        if candidate_ids.is_empty() {
            if let Some(bindings) = self.by_function.get(function) {
                for binding in bindings.iter().filter(|b| b.can_handle(args)) {
                    collect_match(&mut matched, &mut ambiguous, binding);
                }
            }
        } else {
            for id in candidate_ids {
                if let Some(binding) = self.by_overload.get(id.as_str())
                    && binding.can_handle(args)
                {
                    collect_match(&mut matched, &mut ambiguous, binding);
                }
            }
        }

        if !ambiguous.is_empty() {
            return Resolution::Ambiguous(EvalError::ambiguous_overload(function, &ambiguous));
        }
        match matched {
            Some(binding) => Resolution::Overload(binding.clone()),
            None => Resolution::NoMatch,
        }
    }
}

fn collect_match<'a>(matched: &mut Option<&'a Arc<FunctionBinding>>, ambiguous: &mut Vec<&'a str>, binding: &'a Arc<FunctionBinding>) {
    match matched {
        None => *matched = Some(binding),
        Some(first) => {
            if ambiguous.is_empty() {
                ambiguous.push(first.overload_id());
            }
            ambiguous.push(binding.overload_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(id: &str, arg: ArgType) -> FunctionBinding {
        FunctionBinding::new(id, vec![arg], |_| Value::Null).with_function("f")
    }

    #[test]
    fn single_match_resolves() {
        let mut b = DispatcherBuilder::new();
        b.register(binding("f_int", ArgType::Kind(Kind::Int))).unwrap();
        b.register(binding("f_string", ArgType::Kind(Kind::String))).unwrap();
        let d = b.freeze();

        match d.resolve("f", &[], &[Value::Int(1)]) {
            Resolution::Overload(ov) => assert_eq!(ov.overload_id(), "f_int"),
            _ => panic!("expected a unique overload"),
        }
    }

    #[test]
    fn two_dynamic_matches_are_ambiguous() {
        let mut b = DispatcherBuilder::new();
        b.register(binding("f_any", ArgType::Any)).unwrap();
        b.register(binding("f_int", ArgType::Kind(Kind::Int))).unwrap();
        let d = b.freeze();

        match d.resolve("f", &[], &[Value::Int(1)]) {
            Resolution::Ambiguous(err) => {
                assert_eq!(err.kind(), crate::error::ErrorKind::AmbiguousOverload);
            }
            _ => panic!("expected ambiguity"),
        }
    }

    #[test]
    fn candidate_ids_restrict_the_search() {
        let mut b = DispatcherBuilder::new();
        b.register(binding("f_any", ArgType::Any)).unwrap();
        b.register(binding("f_int", ArgType::Kind(Kind::Int))).unwrap();
        let d = b.freeze();

        // With candidates the name table is not consulted, so the Any
        // overload never competes.
        match d.resolve("f", &["f_int".to_owned()], &[Value::Int(1)]) {
            Resolution::Overload(ov) => assert_eq!(ov.overload_id(), "f_int"),
            _ => panic!("expected a unique overload"),
        }
        // Missing candidate ids are skipped, not errors.
        match d.resolve("f", &["f_late".to_owned()], &[Value::Int(1)]) {
            Resolution::NoMatch => {}
            _ => panic!("expected no match"),
        }
    }

    #[test]
    fn strict_overloads_reject_error_and_unknown_args() {
        let mut b = DispatcherBuilder::new();
        b.register(binding("f_any", ArgType::Any)).unwrap();
        let d = b.freeze();

        let err_arg = Value::error(EvalError::divide_by_zero());
        match d.resolve("f", &[], std::slice::from_ref(&err_arg)) {
            Resolution::NoMatch => {}
            _ => panic!("strict overload must not handle an error argument"),
        }
    }

    #[test]
    fn duplicate_overload_ids_are_rejected() {
        let mut b = DispatcherBuilder::new();
        b.register(binding("f_int", ArgType::Kind(Kind::Int))).unwrap();
        let err = b.register(binding("f_int", ArgType::Kind(Kind::Int))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
