//! Evaluation options and resource limits.

/// Default cap on accumulated unknown-attribute entries per evaluation.
pub const DEFAULT_MAX_UNKNOWN_ENTRIES: usize = 500_000;

/// Default cap on a compiled regex program, in bytes.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 256 * 1024;

/// Immutable per-program evaluation options.
///
/// Captured when the `Program` is built; every evaluation of that program
/// runs under the same options.
#[derive(Debug, Clone)]
pub struct EvalOptions {
    /// Fail integer arithmetic on overflow instead of wrapping.
    pub overflow_checks: bool,
    /// Register the `{int, uint, double}` cross-kind ordering overloads.
    pub heterogeneous_comparisons: bool,
    /// Run the unknown-tracking sub-evaluator: activations may carry
    /// attribute patterns and matching inputs evaluate to unknowns. Without
    /// this, only values and errors exist.
    pub unknown_tracking: bool,
    /// Cap on accumulated unknown entries; merges beyond it fail with
    /// `Overflow`.
    pub max_unknown_entries: usize,
    /// Cap on compiled regex program size for the `matches` overload,
    /// bounding pathological pattern compilation.
    pub regex_size_limit: usize,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            overflow_checks: true,
            heterogeneous_comparisons: true,
            unknown_tracking: false,
            max_unknown_entries: DEFAULT_MAX_UNKNOWN_ENTRIES,
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl EvalOptions {
    /// Options with the unknown-tracking sub-evaluator enabled.
    #[must_use]
    pub fn with_unknown_tracking() -> Self {
        Self {
            unknown_tracking: true,
            ..Self::default()
        }
    }
}
