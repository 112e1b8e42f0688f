//! Public interface for evaluating checked CEL expressions.

use std::{fmt, sync::Arc};

use crate::{
    activation::{Activation, VariableResolver},
    attribute::{Attribute, AttributePattern},
    dispatch::{Dispatcher, DispatcherBuilder, FunctionBinding},
    error::{EvalError, EvalResult},
    interp::Evaluator,
    listener::EvalListener,
    options::EvalOptions,
    scope::ScopeStack,
    stdlib,
    types::{DynProvider, TypeProvider, ValueProvider},
    unknown::UnknownSet,
    value::Value,
};
use crate::ast::CheckedAst;

/// A planned, immutable CEL program: checked AST + frozen dispatch table +
/// options + providers.
///
/// Programs are created once and reused; they are deeply immutable and safe
/// to evaluate concurrently from multiple threads. Each evaluation allocates
/// its own scope stack and unknown accumulator, so parallel `eval` calls on
/// the same program produce identical results.
///
/// # Example
/// ```
/// use celrt::{ops, AstBuilder, EvalOptions, Program, Value};
///
/// let mut b = AstBuilder::new();
/// let one = b.int(1);
/// let two = b.int(2);
/// let sum = b.global_call(ops::ADD, vec![one, two]);
/// let program = Program::new(b.build(sum), EvalOptions::default()).unwrap();
/// assert_eq!(program.eval().unwrap(), Value::Int(3));
/// ```
#[derive(Debug, Clone)]
pub struct Program {
    ast: Arc<CheckedAst>,
    dispatcher: Arc<Dispatcher>,
    options: EvalOptions,
    type_provider: Arc<dyn TypeProvider>,
    value_provider: Arc<dyn ValueProvider>,
}

impl Program {
    /// Plans a program with the standard library and dynamic providers.
    pub fn new(ast: CheckedAst, options: EvalOptions) -> EvalResult<Self> {
        Self::with_functions(ast, options, vec![])
    }

    /// Plans a program with additional function bindings layered over the
    /// standard library.
    pub fn with_functions(ast: CheckedAst, options: EvalOptions, functions: Vec<FunctionBinding>) -> EvalResult<Self> {
        Self::with_providers(ast, options, functions, Arc::new(DynProvider), Arc::new(DynProvider))
    }

    /// Plans a program with custom type/value providers, e.g. a protobuf
    /// message layer.
    pub fn with_providers(
        ast: CheckedAst,
        options: EvalOptions,
        functions: Vec<FunctionBinding>,
        type_provider: Arc<dyn TypeProvider>,
        value_provider: Arc<dyn ValueProvider>,
    ) -> EvalResult<Self> {
        let mut builder = DispatcherBuilder::new();
        stdlib::register_standard(&mut builder, &options)?;
        for binding in functions {
            builder.register(binding)?;
        }
        Ok(Self {
            ast: Arc::new(ast),
            dispatcher: Arc::new(builder.freeze()),
            options,
            type_provider,
            value_provider,
        })
    }

    /// The checked AST this program was planned from.
    #[must_use]
    pub fn ast(&self) -> &CheckedAst {
        &self.ast
    }

    /// Evaluates with no variable bindings.
    pub fn eval(&self) -> EvalResult<Value> {
        self.eval_with(&Activation::empty())
    }

    /// Evaluates with a map of variable bindings.
    pub fn eval_map(&self, variables: impl IntoIterator<Item = (String, Value)>) -> EvalResult<Value> {
        self.eval_with(&Activation::from_map(variables))
    }

    /// Evaluates with a custom variable resolver.
    ///
    /// Returns `Ok` for concrete results and for unknown results (as a
    /// `Value::Unknown` carrying the [`UnknownSet`]); only a root-level
    /// error becomes `Err`.
    pub fn eval_with(&self, resolver: &dyn VariableResolver) -> EvalResult<Value> {
        self.run(resolver, None, None, &[], &[])
    }

    /// Evaluates with a late-bound function table layered behind the
    /// program's dispatcher.
    ///
    /// Late-bound overloads are consulted only when the program's own table
    /// has no matching overload, and are supplied per evaluation.
    pub fn eval_with_functions(&self, resolver: &dyn VariableResolver, late_bound: &Dispatcher) -> EvalResult<Value> {
        self.run(resolver, Some(late_bound), None, &[], &[])
    }

    /// Evaluates with attribute patterns declaring which inputs are unknown.
    ///
    /// Supplying patterns turns on unknown tracking for this evaluation even
    /// when the program options leave it off.
    pub fn eval_partial(&self, resolver: &dyn VariableResolver, patterns: &[AttributePattern]) -> EvalResult<Value> {
        self.run(resolver, None, None, patterns, &[])
    }

    /// Evaluates while reporting each concrete sub-expression result to the
    /// listener, in AST post-order on the evaluating thread.
    pub fn trace(&self, resolver: &dyn VariableResolver, listener: &mut dyn EvalListener) -> EvalResult<Value> {
        self.run(resolver, None, Some(listener), &[], &[])
    }

    /// One round of iterative evaluation against an [`UnknownContext`].
    ///
    /// Callers inspect the result: on `Value::Unknown`, resolve some of the
    /// reported attributes (see [`UnknownContext::resolve_pending`] or
    /// [`UnknownContext::with_resolved_attributes`]) and call again until
    /// the value is concrete or no progress is possible. Resolving more
    /// attributes between rounds never changes already-concrete
    /// sub-expression values; the unknown set only shrinks.
    pub fn advance_evaluation(&self, context: &UnknownContext) -> EvalResult<Value> {
        let patterns: Vec<AttributePattern> = context
            .patterns
            .iter()
            .map(|resolvable| resolvable.pattern().clone())
            .collect();
        self.run(
            context.resolver.as_ref(),
            None,
            None,
            &patterns,
            &context.resolved,
        )
    }

    fn run<'a, 'b, 'c>(
        &'a self,
        resolver: &'a dyn VariableResolver,
        late_bound: Option<&'a Dispatcher>,
        listener: Option<&'b mut dyn EvalListener>,
        patterns: &'a [AttributePattern],
        resolved: &'a [(Attribute, Value)],
    ) -> EvalResult<Value> {
        let mut options = self.options.clone();
        if !patterns.is_empty() {
            options.unknown_tracking = true;
        }
        let evaluator = Evaluator {
            ast: &self.ast,
            dispatcher: &self.dispatcher,
            late_bound,
            type_provider: self.type_provider.as_ref(),
            value_provider: self.value_provider.as_ref(),
            options: &options,
            resolver,
            patterns,
            resolved,
            listener,
            scopes: ScopeStack::new(),
            lazy_inits: Vec::new(),
        };
        match evaluator.evaluate() {
            Value::Error(err) => Err(self.locate(*err)),
            value => Ok(value),
        }
    }

    /// Anchors an error to its source offset when the AST metadata has one.
    fn locate(&self, err: EvalError) -> EvalError {
        let Some(id) = err.expr_id() else { return err };
        let Some(offset) = self.ast.source_info.offset(id) else {
            return err;
        };
        let source = self.ast.source_info.description().unwrap_or("<input>").to_owned();
        err.with_location(source, offset)
    }
}

/// An attribute pattern plus a callback that can produce the attribute's
/// value between iterative evaluation rounds.
#[derive(Clone)]
pub struct ResolvableAttributePattern {
    pattern: AttributePattern,
    resolver: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl ResolvableAttributePattern {
    #[must_use]
    pub fn new(pattern: AttributePattern, resolver: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self {
            pattern,
            resolver: Arc::new(resolver),
        }
    }

    #[must_use]
    pub fn pattern(&self) -> &AttributePattern {
        &self.pattern
    }

    /// Fetches the unknown's value.
    #[must_use]
    pub fn resolve(&self) -> Value {
        (self.resolver)()
    }
}

impl fmt::Debug for ResolvableAttributePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvableAttributePattern")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Carrier for iterative (multi-round) evaluation: a resolver, the unknown
/// patterns with their resolution callbacks, and the attributes already
/// resolved in earlier rounds.
#[derive(Debug, Clone)]
pub struct UnknownContext {
    resolver: Arc<dyn VariableResolver>,
    patterns: Vec<ResolvableAttributePattern>,
    resolved: Vec<(Attribute, Value)>,
}

impl UnknownContext {
    #[must_use]
    pub fn new(resolver: Arc<dyn VariableResolver>, patterns: Vec<ResolvableAttributePattern>) -> Self {
        Self {
            resolver,
            patterns,
            resolved: Vec::new(),
        }
    }

    /// Returns a context with additional attributes resolved to concrete
    /// values. A re-resolved attribute replaces its earlier value.
    #[must_use]
    pub fn with_resolved_attributes(mut self, entries: impl IntoIterator<Item = (Attribute, Value)>) -> Self {
        for (attribute, value) in entries {
            match self.resolved.iter_mut().find(|(existing, _)| *existing == attribute) {
                Some(slot) => slot.1 = value,
                None => self.resolved.push((attribute, value)),
            }
        }
        self
    }

    /// The attributes resolved so far.
    #[must_use]
    pub fn resolved_attributes(&self) -> &[(Attribute, Value)] {
        &self.resolved
    }

    /// Resolves every attribute in the unknown set that some pattern's
    /// callback can supply, returning the advanced context.
    ///
    /// Returns `None` when no attribute could be resolved — the signal that
    /// iteration cannot make further progress.
    #[must_use]
    pub fn resolve_pending(&self, unknowns: &UnknownSet) -> Option<Self> {
        let mut entries: Vec<(Attribute, Value)> = Vec::new();
        for attribute in unknowns.attributes() {
            let hit = self
                .patterns
                .iter()
                .find(|resolvable| resolvable.pattern().is_match(attribute));
            if let Some(resolvable) = hit {
                entries.push((attribute.clone(), resolvable.resolve()));
            }
        }
        if entries.is_empty() {
            return None;
        }
        Some(self.clone().with_resolved_attributes(entries))
    }
}
