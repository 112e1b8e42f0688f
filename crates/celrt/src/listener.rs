//! Evaluation tracing infrastructure.
//!
//! Provides a trait-based listener system for the evaluator. When using
//! [`NoopListener`] the hook compiles down to nothing, so tracing costs only
//! what an implementation actually records.
//!
//! | Listener | Purpose |
//! |----------|---------|
//! | [`NoopListener`] | No-op default |
//! | [`RecordingListener`] | Captures `(ExprId, Value)` events for assertions or post-mortem |
//! | [`StderrListener`] | Human-readable evaluation log to stderr |
//!
//! Listeners are invoked synchronously on the evaluating thread in AST
//! post-order, once per node that produced a concrete result (errors and
//! unknowns are not reported). They must be side-effect-safe: a listener
//! cannot influence the evaluation result.

use crate::{ast::ExprId, value::Value};

/// Trait for observing per-node evaluation results.
///
/// The single hook has a default no-op implementation, so [`NoopListener`]
/// requires zero lines of code.
pub trait EvalListener: std::fmt::Debug {
    /// Called after an expression node evaluates to a concrete value.
    ///
    /// # Arguments
    /// * `id` - The expression id of the node just evaluated
    /// * `value` - The node's concrete result
    #[inline]
    fn on_value(&mut self, _id: ExprId, _value: &Value) {}
}

/// A listener that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl EvalListener for NoopListener {}

/// Listener that records every `(ExprId, Value)` event in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Vec<(ExprId, Value)>,
}

impl RecordingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded events, in evaluation (post-) order.
    #[must_use]
    pub fn events(&self) -> &[(ExprId, Value)] {
        &self.events
    }

    /// The last recorded value for an expression id, if any.
    #[must_use]
    pub fn value_of(&self, id: ExprId) -> Option<&Value> {
        self.events
            .iter()
            .rev()
            .find_map(|(event_id, value)| (*event_id == id).then_some(value))
    }
}

impl EvalListener for RecordingListener {
    fn on_value(&mut self, id: ExprId, value: &Value) {
        self.events.push((id, value.clone()));
    }
}

/// Listener that prints a human-readable evaluation log to stderr.
///
/// Output format:
/// ```text
/// [   3] -> 7
/// [   5] -> "alice"
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrListener;

impl EvalListener for StderrListener {
    fn on_value(&mut self, id: ExprId, value: &Value) {
        eprintln!("[{id:>4}] -> {value}");
    }
}
