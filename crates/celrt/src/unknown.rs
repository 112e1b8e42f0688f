//! Unknown-attribute sets and the merge accumulator.
//!
//! An [`UnknownSet`] is the immutable witness returned when evaluation could
//! not resolve part of the input: the set of attributes that matched an
//! unknown pattern, plus the expression ids of resolver misses kept for
//! diagnostics. Merging is set union.
//!
//! Inside a single evaluation unions are hot (every strict call folds its
//! argument unknowns), so the driver merges through the mutable
//! [`UnknownAccumulator`] and freezes the result into an `UnknownSet` before
//! it can escape into a cached scope slot or the caller's hands. The
//! accumulator also enforces the unknown-entry cap from the evaluation
//! options; merges past the cap fail with `Overflow`.

use std::fmt::{self, Display};
use std::sync::Arc;

use ahash::AHashSet;

use crate::{
    ast::ExprId,
    attribute::Attribute,
    error::{EvalError, EvalResult},
};

/// An immutable set of unknown attributes with their originating expression ids.
///
/// Attributes and ids are stored sorted and deduplicated so that equal sets
/// compare equal and render identically regardless of merge order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnknownSet {
    attributes: Box<[Attribute]>,
    expr_ids: Box<[ExprId]>,
}

impl UnknownSet {
    /// Creates a set holding a single unknown attribute.
    #[must_use]
    pub fn from_attribute(attribute: Attribute) -> Self {
        Self {
            attributes: Box::new([attribute]),
            expr_ids: Box::new([]),
        }
    }

    /// Creates a set holding a single originating expression id.
    ///
    /// Used when an identifier misses the resolver entirely; the reporting
    /// layer matches on ids, the pattern layer never does.
    #[must_use]
    pub fn from_expr_id(id: ExprId) -> Self {
        Self {
            attributes: Box::new([]),
            expr_ids: Box::new([id]),
        }
    }

    /// The unknown attributes, sorted.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The originating expression ids, sorted. Diagnostics only.
    #[must_use]
    pub fn expr_ids(&self) -> &[ExprId] {
        &self.expr_ids
    }

    /// True when the set tracks the given attribute.
    #[must_use]
    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.attributes.binary_search(attribute).is_ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.expr_ids.is_empty()
    }
}

impl Display for UnknownSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown{")?;
        let mut first = true;
        for attr in &self.attributes {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{attr}")?;
            first = false;
        }
        for id in &self.expr_ids {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "#{id}")?;
            first = false;
        }
        f.write_str("}")
    }
}

/// Mutable union accumulator, internal to a single evaluation.
///
/// Converted into an immutable [`UnknownSet`] via [`UnknownAccumulator::freeze`]
/// before any result leaves the evaluator.
#[derive(Debug)]
pub(crate) struct UnknownAccumulator {
    attributes: AHashSet<Attribute>,
    expr_ids: AHashSet<ExprId>,
    limit: usize,
}

impl UnknownAccumulator {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            attributes: AHashSet::new(),
            expr_ids: AHashSet::new(),
            limit,
        }
    }

    /// Unions another set into the accumulator, enforcing the entry cap.
    pub(crate) fn merge(&mut self, set: &UnknownSet) -> EvalResult<()> {
        for attr in &set.attributes {
            self.attributes.insert(attr.clone());
        }
        for id in &set.expr_ids {
            self.expr_ids.insert(*id);
        }
        if self.attributes.len() + self.expr_ids.len() > self.limit {
            return Err(EvalError::overflow("unknown set"));
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.expr_ids.is_empty()
    }

    /// Converts the accumulated union into an immutable, sorted set.
    pub(crate) fn freeze(self) -> Arc<UnknownSet> {
        let mut attributes: Vec<Attribute> = self.attributes.into_iter().collect();
        attributes.sort();
        let mut expr_ids: Vec<ExprId> = self.expr_ids.into_iter().collect();
        expr_ids.sort();
        Arc::new(UnknownSet {
            attributes: attributes.into_boxed_slice(),
            expr_ids: expr_ids.into_boxed_slice(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_order_independent() {
        let a = UnknownSet::from_attribute(Attribute::root("a").unwrap());
        let b = UnknownSet::from_attribute(Attribute::root("b").unwrap());

        let mut left = UnknownAccumulator::new(100);
        left.merge(&a).unwrap();
        left.merge(&b).unwrap();
        let mut right = UnknownAccumulator::new(100);
        right.merge(&b).unwrap();
        right.merge(&a).unwrap();

        assert_eq!(left.freeze(), right.freeze());
    }

    #[test]
    fn merge_past_limit_overflows() {
        let mut acc = UnknownAccumulator::new(1);
        acc.merge(&UnknownSet::from_attribute(Attribute::root("a").unwrap()))
            .unwrap();
        let err = acc
            .merge(&UnknownSet::from_attribute(Attribute::root("b").unwrap()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Overflow);
    }
}
