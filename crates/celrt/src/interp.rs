//! The evaluator driver: a recursive walk over the checked AST.
//!
//! Every node evaluates to an [`IntermediateResult`] — an optional attribute
//! trail plus a value, where the value may be a concrete value, an error
//! carrier, or an unknown set. Strict calls fold their argument results
//! under the tri-valued algebra (unknown union beats the first error beats
//! invocation); `_&&_`, `_||_`, `_?_:_`, and `_[_]` are handled inline
//! because their semantics depend on evaluation order, not just argument
//! values. Everything else goes through the frozen dispatch table, with an
//! optional late-bound table layered behind it.
//!
//! The driver is per-evaluation state only: the program it walks is shared
//! and immutable.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    activation::VariableResolver,
    ast::{CheckedAst, Expr, ExprId, ExprKind, MapEntryExpr, StructFieldExpr, ops},
    attribute::{Attribute, AttributePattern, Qualifier},
    dispatch::{Dispatcher, Resolution},
    error::EvalError,
    listener::EvalListener,
    numeric,
    options::EvalOptions,
    scope::{ScopeLookup, ScopeStack},
    types::{self, TypeProvider, ValueProvider},
    unknown::{UnknownAccumulator, UnknownSet},
    value::{MapValue, Value},
};

/// The result of evaluating one AST node: the attribute trail accumulated
/// through identifier/select/index steps (when unknown tracking is on) and
/// the node's value.
#[derive(Debug, Clone)]
pub(crate) struct IntermediateResult {
    pub(crate) attribute: Option<Attribute>,
    pub(crate) value: Value,
}

impl IntermediateResult {
    pub(crate) fn of(value: Value) -> Self {
        Self {
            attribute: None,
            value,
        }
    }

    fn with_attribute(attribute: Option<Attribute>, value: Value) -> Self {
        Self { attribute, value }
    }
}

/// Attaches the failing expression id to a newly-minted error carrier.
/// Propagated errors keep their original anchor.
fn tag(id: ExprId, value: Value) -> Value {
    match value {
        Value::Error(err) => Value::Error(Box::new(err.with_expr_id(id))),
        other => other,
    }
}

/// Per-evaluation driver state.
///
/// Constructed by `Program` for each evaluation; the borrowed fields point
/// at the shared immutable program and at per-evaluation inputs.
pub(crate) struct Evaluator<'a, 'b, 'c> {
    pub(crate) ast: &'a CheckedAst,
    pub(crate) dispatcher: &'a Dispatcher,
    pub(crate) late_bound: Option<&'a Dispatcher>,
    pub(crate) type_provider: &'a dyn TypeProvider,
    pub(crate) value_provider: &'a dyn ValueProvider,
    pub(crate) options: &'c EvalOptions,
    pub(crate) resolver: &'a dyn VariableResolver,
    /// Patterns declaring which inputs are unknown for this evaluation.
    pub(crate) patterns: &'a [AttributePattern],
    /// Attributes resolved between iterative rounds; consulted before the
    /// patterns so resolved inputs stop evaluating to unknowns.
    pub(crate) resolved: &'a [(Attribute, Value)],
    pub(crate) listener: Option<&'b mut dyn EvalListener>,
    pub(crate) scopes: ScopeStack,
    /// Initializer expressions of declared-but-unforced lazy slots,
    /// innermost last.
    pub(crate) lazy_inits: Vec<(Arc<str>, &'a Expr)>,
}

impl<'a, 'b, 'c> Evaluator<'a, 'b, 'c> {
    /// Evaluates the program's root expression to a final value.
    pub(crate) fn evaluate(mut self) -> Value {
        let ast = self.ast;
        self.eval(&ast.root).value
    }

    fn tracking(&self) -> bool {
        self.options.unknown_tracking
    }

    fn eval(&mut self, expr: &'a Expr) -> IntermediateResult {
        let result = match &expr.kind {
            ExprKind::Constant(constant) => IntermediateResult::of(tag(expr.id, constant.to_value())),
            ExprKind::Ident { name } => self.eval_ident(expr.id, name),
            ExprKind::Select {
                operand,
                field,
                test_only,
            } => self.eval_select(expr.id, operand, field, *test_only),
            ExprKind::Call { target, function, args } => {
                self.eval_call(expr.id, target.as_deref(), function, args)
            }
            ExprKind::List { elements } => self.eval_list(expr.id, elements),
            ExprKind::Map { entries } => self.eval_map(expr.id, entries),
            ExprKind::Struct { type_name, fields } => self.eval_struct(expr.id, type_name, fields),
            ExprKind::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => self.eval_comprehension(
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            ),
        };
        if let Some(listener) = self.listener.as_deref_mut()
            && !result.value.is_error()
            && !result.value.is_unknown()
        {
            listener.on_value(expr.id, &result.value);
        }
        result
    }

    // --- identifiers -----------------------------------------------------

    fn eval_ident(&mut self, id: ExprId, name: &str) -> IntermediateResult {
        // Comprehension scopes shadow everything else.
        match self.scopes.lookup(name) {
            ScopeLookup::Found(result) => return result,
            ScopeLookup::Pending => return self.force_lazy(id, name),
            ScopeLookup::Absent => {}
        }

        // Only carry a trail that can still lead somewhere: patterns match
        // elementwise from the root, so a root that neither matches nor
        // prefix-matches any pattern can never produce an unknown deeper in
        // the path. Resolved attributes are kept conservatively.
        let attribute = if self.tracking() {
            Attribute::root(name).ok().filter(|attr| self.trail_matters(attr))
        } else {
            None
        };
        if let Some(attr) = &attribute {
            if let Some(value) = self.find_resolved(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), value);
            }
            if let Some(unknown) = self.match_patterns(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), unknown);
            }
        }

        if let Some(value) = self.resolver.find(name) {
            return IntermediateResult::with_attribute(attribute, value);
        }
        if let Some(t) = types::builtin_type(name).or_else(|| self.type_provider.find_type(name)) {
            return IntermediateResult::of(Value::Type(t));
        }
        // Resolver miss: an unknown keyed by the expression id, for
        // compatibility with id-based reporting layers.
        IntermediateResult::with_attribute(attribute, Value::Unknown(Arc::new(UnknownSet::from_expr_id(id))))
    }

    /// Forces a declared lazy slot: evaluates its initializer once and caches
    /// the result at the declaring scope.
    fn force_lazy(&mut self, id: ExprId, name: &str) -> IntermediateResult {
        let init = self
            .lazy_inits
            .iter()
            .rev()
            .find_map(|(slot, expr)| (slot.as_ref() == name).then_some(*expr));
        match init {
            Some(expr) => {
                let result = self.eval(expr);
                self.scopes.cache_lazy(name, result.clone());
                result
            }
            None => IntermediateResult::of(tag(
                id,
                Value::error(EvalError::internal(format!("lazy slot '{name}' has no initializer"))),
            )),
        }
    }

    fn trail_matters(&self, attribute: &Attribute) -> bool {
        !self.resolved.is_empty()
            || self
                .patterns
                .iter()
                .any(|pattern| pattern.is_match(attribute) || pattern.is_partial_match(attribute))
    }

    fn find_resolved(&self, attribute: &Attribute) -> Option<Value> {
        self.resolved
            .iter()
            .find_map(|(resolved, value)| (resolved == attribute).then(|| value.clone()))
    }

    /// Matches an attribute against the evaluation's unknown patterns,
    /// producing the unknown witness value on a hit.
    fn match_patterns(&self, attribute: &Attribute) -> Option<Value> {
        self.patterns.iter().find_map(|pattern| {
            pattern.is_match(attribute).then(|| {
                let witness = pattern.simplify(attribute);
                Value::Unknown(Arc::new(UnknownSet::from_attribute(witness)))
            })
        })
    }

    // --- select and index ------------------------------------------------

    fn eval_select(&mut self, id: ExprId, operand: &'a Expr, field: &str, test_only: bool) -> IntermediateResult {
        let operand_result = self.eval(operand);
        let attribute = operand_result
            .attribute
            .as_ref()
            .map(|attr| attr.qualify(Qualifier::from(field)));

        if operand_result.value.is_error() || operand_result.value.is_unknown() {
            return IntermediateResult::with_attribute(attribute, operand_result.value);
        }
        if let Some(attr) = &attribute {
            if let Some(value) = self.find_resolved(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), value);
            }
            if let Some(unknown) = self.match_patterns(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), unknown);
            }
        }

        let value = match &operand_result.value {
            Value::Map(map) => match map.get(&Value::string(field)) {
                Some(value) => {
                    if test_only {
                        Value::Bool(true)
                    } else {
                        value.clone()
                    }
                }
                None => {
                    if test_only {
                        Value::Bool(false)
                    } else {
                        Value::error(EvalError::no_such_attribute(format!("no such key: '{field}'")))
                    }
                }
            },
            Value::Struct(s) => {
                if test_only {
                    Value::Bool(self.value_provider.has(s.as_ref(), field))
                } else {
                    match self.value_provider.select(s.as_ref(), field) {
                        Some(value) => value,
                        None => Value::error(EvalError::no_such_attribute(format!(
                            "no such field '{field}' on type '{}'",
                            s.type_name()
                        ))),
                    }
                }
            }
            other => Value::error(EvalError::type_mismatch(format!(
                "cannot select field '{field}' from value of kind '{}'",
                other.kind()
            ))),
        };
        IntermediateResult::with_attribute(attribute, tag(id, value))
    }

    fn eval_index(&mut self, id: ExprId, args: &'a [Expr]) -> IntermediateResult {
        let [operand_expr, index_expr] = args else {
            return malformed(id, ops::INDEX);
        };
        let operand = self.eval(operand_expr);
        let index = self.eval(index_expr);

        let attribute = match (&operand.attribute, qualifier_from_value(&index.value)) {
            (Some(attr), Some(qualifier)) => Some(attr.qualify(qualifier)),
            _ => None,
        };
        if let Some(propagated) = self.fold_strict(id, &[operand.value.clone(), index.value.clone()]) {
            return IntermediateResult::with_attribute(attribute, propagated);
        }
        if let Some(attr) = &attribute {
            if let Some(value) = self.find_resolved(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), value);
            }
            if let Some(unknown) = self.match_patterns(attr) {
                return IntermediateResult::with_attribute(attribute.clone(), unknown);
            }
        }

        let value = match &operand.value {
            Value::List(items) => list_index(items, &index.value),
            Value::Map(map) => match map.get(&index.value) {
                Some(value) => value.clone(),
                None => Value::error(EvalError::no_such_key(&index.value)),
            },
            other => Value::error(EvalError::type_mismatch(format!(
                "cannot index value of kind '{}'",
                other.kind()
            ))),
        };
        IntermediateResult::with_attribute(attribute, tag(id, value))
    }

    // --- calls -----------------------------------------------------------

    fn eval_call(
        &mut self,
        id: ExprId,
        target: Option<&'a Expr>,
        function: &str,
        args: &'a [Expr],
    ) -> IntermediateResult {
        match function {
            ops::LOGICAL_AND => self.eval_and(id, args),
            ops::LOGICAL_OR => self.eval_or(id, args),
            ops::CONDITIONAL => self.eval_conditional(id, args),
            ops::INDEX => self.eval_index(id, args),
            _ => self.eval_dispatch(id, target, function, args),
        }
    }

    fn eval_and(&mut self, id: ExprId, args: &'a [Expr]) -> IntermediateResult {
        let [lhs_expr, rhs_expr] = args else {
            return malformed(id, ops::LOGICAL_AND);
        };
        let lhs = self.eval(lhs_expr).value;
        if matches!(lhs, Value::Bool(false)) {
            return IntermediateResult::of(Value::Bool(false));
        }
        let rhs = self.eval(rhs_expr).value;
        if matches!(rhs, Value::Bool(false)) {
            return IntermediateResult::of(Value::Bool(false));
        }
        IntermediateResult::of(self.combine_logic(id, ops::LOGICAL_AND, lhs, rhs))
    }

    fn eval_or(&mut self, id: ExprId, args: &'a [Expr]) -> IntermediateResult {
        let [lhs_expr, rhs_expr] = args else {
            return malformed(id, ops::LOGICAL_OR);
        };
        let lhs = self.eval(lhs_expr).value;
        if matches!(lhs, Value::Bool(true)) {
            return IntermediateResult::of(Value::Bool(true));
        }
        let rhs = self.eval(rhs_expr).value;
        if matches!(rhs, Value::Bool(true)) {
            return IntermediateResult::of(Value::Bool(true));
        }
        IntermediateResult::of(self.combine_logic(id, ops::LOGICAL_OR, lhs, rhs))
    }

    /// Combines the two operand results of `&&`/`||` after the dominant
    /// boolean (false resp. true) has been ruled out.
    ///
    /// At this point a bool pair can only be the neutral pair (both true for
    /// `&&`, both false for `||`), so the remaining algebra is shared:
    /// unknowns beat errors, two unknowns union, two errors keep the left.
    fn combine_logic(&mut self, id: ExprId, function: &str, lhs: Value, rhs: Value) -> Value {
        match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(_)) => Value::Bool(a),
            (Value::Unknown(a), Value::Unknown(b)) => self.union_unknowns(id, [&a, &b]),
            (unknown @ Value::Unknown(_), _) => unknown,
            (_, unknown @ Value::Unknown(_)) => unknown,
            (error @ Value::Error(_), _) => error,
            (_, error @ Value::Error(_)) => error,
            (lhs, rhs) => tag(
                id,
                Value::error(EvalError::no_such_overload(
                    function,
                    &format!("{}, {}", lhs.kind(), rhs.kind()),
                )),
            ),
        }
    }

    fn eval_conditional(&mut self, id: ExprId, args: &'a [Expr]) -> IntermediateResult {
        let [cond_expr, then_expr, else_expr] = args else {
            return malformed(id, ops::CONDITIONAL);
        };
        match self.eval(cond_expr).value {
            Value::Bool(true) => self.eval(then_expr),
            Value::Bool(false) => self.eval(else_expr),
            propagated @ (Value::Unknown(_) | Value::Error(_)) => IntermediateResult::of(propagated),
            other => IntermediateResult::of(tag(
                id,
                Value::error(EvalError::no_such_overload(ops::CONDITIONAL, &other.kind().to_string())),
            )),
        }
    }

    fn eval_dispatch(
        &mut self,
        id: ExprId,
        target: Option<&'a Expr>,
        function: &str,
        args: &'a [Expr],
    ) -> IntermediateResult {
        let mut values: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
        if let Some(target) = target {
            values.push(self.eval(target).value);
        }
        for arg in args {
            values.push(self.eval(arg).value);
        }

        let candidates = self
            .ast
            .references
            .get(id)
            .map_or(&[] as &[String], |reference| reference.overload_ids.as_slice());

        let mut resolution = self.dispatcher.resolve(function, candidates, &values);
        if matches!(resolution, Resolution::NoMatch)
            && let Some(late_bound) = self.late_bound
        {
            resolution = late_bound.resolve(function, candidates, &values);
        }

        let value = match resolution {
            Resolution::Overload(overload) => {
                // can_handle admitted error/unknown args only for non-strict
                // overloads, so a matched overload is always invokable.
                debug_assert!(!overload.is_strict() || self.fold_strict(id, &values).is_none());
                overload.invoke(&values)
            }
            Resolution::Ambiguous(err) => Value::error(err),
            Resolution::NoMatch => {
                if let Some(propagated) = self.fold_strict(id, &values) {
                    return IntermediateResult::of(propagated);
                }
                Value::error(EvalError::no_such_overload(function, &kinds_of(&values)))
            }
        };
        IntermediateResult::of(tag(id, value))
    }

    // --- aggregate literals ----------------------------------------------

    fn eval_list(&mut self, id: ExprId, elements: &'a [Expr]) -> IntermediateResult {
        let values: Vec<Value> = elements.iter().map(|element| self.eval(element).value).collect();
        if let Some(propagated) = self.fold_strict(id, &values) {
            return IntermediateResult::of(propagated);
        }
        IntermediateResult::of(Value::from(values))
    }

    fn eval_map(&mut self, id: ExprId, entries: &'a [MapEntryExpr]) -> IntermediateResult {
        let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = self.eval(&entry.key).value;
            let value = self.eval(&entry.value).value;
            pairs.push((key, value));
        }
        let flat: Vec<Value> = pairs.iter().flat_map(|(k, v)| [k.clone(), v.clone()]).collect();
        if let Some(propagated) = self.fold_strict(id, &flat) {
            return IntermediateResult::of(propagated);
        }
        let value = match MapValue::from_entries(pairs) {
            Ok(map) => Value::Map(Arc::new(map)),
            Err(err) => Value::error(err),
        };
        IntermediateResult::of(tag(id, value))
    }

    fn eval_struct(&mut self, id: ExprId, type_name: &str, fields: &'a [StructFieldExpr]) -> IntermediateResult {
        let mut pairs: Vec<(Arc<str>, Value)> = Vec::with_capacity(fields.len());
        for field in fields {
            pairs.push((Arc::from(field.field.as_str()), self.eval(&field.value).value));
        }
        let values: Vec<Value> = pairs.iter().map(|(_, value)| value.clone()).collect();
        if let Some(propagated) = self.fold_strict(id, &values) {
            return IntermediateResult::of(propagated);
        }
        let value = match self.value_provider.new_value(type_name, pairs) {
            Some(value) => value,
            None => Value::error(EvalError::invalid_argument(format!(
                "cannot construct value of type '{type_name}'"
            ))),
        };
        IntermediateResult::of(tag(id, value))
    }

    // --- comprehensions --------------------------------------------------

    #[expect(clippy::too_many_arguments, reason = "mirrors the comprehension node's seven parts")]
    fn eval_comprehension(
        &mut self,
        iter_var: &str,
        iter_range: &'a Expr,
        accu_var: &str,
        accu_init: &'a Expr,
        loop_condition: &'a Expr,
        loop_step: &'a Expr,
        result: &'a Expr,
    ) -> IntermediateResult {
        // The `cel.bind` lowering iterates an empty literal range; its
        // accumulator becomes a lazy slot so the bound expression runs only
        // if (and when) the body first reads it, and at most once.
        if let ExprKind::List { elements } = &iter_range.kind
            && elements.is_empty()
        {
            let accu_name: Arc<str> = Arc::from(accu_var);
            self.scopes.push();
            self.scopes.declare_lazy(&accu_name);
            self.lazy_inits.push((accu_name, accu_init));
            let out = self.eval(result);
            self.lazy_inits.pop();
            self.scopes.pop();
            return out;
        }

        let range = self.eval(iter_range);
        if range.value.is_error() || range.value.is_unknown() {
            return IntermediateResult::of(range.value);
        }
        let items: Vec<Value> = match &range.value {
            Value::List(items) => items.to_vec(),
            // Map comprehensions iterate the keys, in insertion order.
            Value::Map(map) => map.keys().cloned().collect(),
            other => {
                return IntermediateResult::of(tag(
                    iter_range.id,
                    Value::error(EvalError::type_mismatch(format!(
                        "value of kind '{}' is not iterable",
                        other.kind()
                    ))),
                ));
            }
        };

        // The accumulator initializer runs in the enclosing scope; the loop
        // variables must not be visible to it.
        let init = self.eval(accu_init);
        let accu_name: Arc<str> = Arc::from(accu_var);
        let iter_name: Arc<str> = Arc::from(iter_var);
        self.scopes.push();
        self.scopes.bind(&accu_name, init);
        for item in items {
            self.scopes.bind(&iter_name, IntermediateResult::of(item));
            // The condition is a @not_strictly_false gate: only a concrete
            // false stops the loop; errors and unknowns keep folding.
            if matches!(self.eval(loop_condition).value, Value::Bool(false)) {
                break;
            }
            let step = self.eval(loop_step);
            self.scopes.bind(&accu_name, step);
        }
        let out = self.eval(result);
        self.scopes.pop();
        out
    }

    // --- tri-valued folding ----------------------------------------------

    /// Folds strict-call argument values: the union of all unknowns if any,
    /// otherwise the first error, otherwise `None` (all concrete).
    fn fold_strict(&mut self, id: ExprId, values: &[Value]) -> Option<Value> {
        let unknowns: SmallVec<[&Arc<UnknownSet>; 4]> = values
            .iter()
            .filter_map(|value| match value {
                Value::Unknown(set) => Some(set),
                _ => None,
            })
            .collect();
        if !unknowns.is_empty() {
            return Some(self.union_unknowns(id, unknowns));
        }
        values.iter().find(|value| value.is_error()).cloned()
    }

    fn union_unknowns<'s>(&mut self, id: ExprId, sets: impl IntoIterator<Item = &'s Arc<UnknownSet>>) -> Value {
        let mut accumulator = UnknownAccumulator::new(self.options.max_unknown_entries);
        for set in sets {
            if let Err(err) = accumulator.merge(set) {
                return tag(id, Value::error(err));
            }
        }
        Value::Unknown(accumulator.freeze())
    }

}

fn malformed(id: ExprId, function: &str) -> IntermediateResult {
    IntermediateResult::of(tag(
        id,
        Value::error(EvalError::internal(format!(
            "malformed call to '{function}' in checked AST"
        ))),
    ))
}

/// Converts a concrete value into an attribute qualifier, if it has one.
fn qualifier_from_value(value: &Value) -> Option<Qualifier> {
    match value {
        Value::String(s) => Some(Qualifier::String(s.clone())),
        Value::Int(i) => Some(Qualifier::Int(*i)),
        Value::Uint(u) => Some(Qualifier::Uint(*u)),
        Value::Bool(b) => Some(Qualifier::Bool(*b)),
        _ => None,
    }
}

/// List indexing: the index must be a lossless non-negative integer; exact
/// integral doubles are accepted.
fn list_index(items: &Arc<[Value]>, index: &Value) -> Value {
    let idx = match index {
        Value::Int(i) => *i,
        Value::Uint(u) => match i64::try_from(*u) {
            Ok(i) => i,
            // Anything past i64::MAX is past any list's end.
            Err(_) => {
                return Value::error(EvalError::new(
                    crate::error::ErrorKind::IndexOutOfBounds,
                    format!("index {u} out of bounds for list of size {}", items.len()),
                ));
            }
        },
        Value::Double(d) => match numeric::exact_i64(*d) {
            Some(i) => i,
            None => {
                return Value::error(EvalError::invalid_argument(format!(
                    "list index must be an integer, got {d:?}"
                )));
            }
        },
        other => {
            return Value::error(EvalError::type_mismatch(format!(
                "list index must be int, got '{}'",
                other.kind()
            )));
        }
    };
    if idx >= 0 && (idx as usize) < items.len() {
        items[idx as usize].clone()
    } else {
        Value::error(EvalError::index_out_of_bounds(idx, items.len()))
    }
}

fn kinds_of(values: &[Value]) -> String {
    let mut out = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        let kind: &'static str = value.kind().into();
        out.push_str(kind);
    }
    out
}
