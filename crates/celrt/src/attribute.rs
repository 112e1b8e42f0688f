//! Attribute paths and the wildcard patterns used to declare inputs unknown.
//!
//! An [`Attribute`] is the qualified path from a root identifier down to a
//! leaf value, e.g. `request.headers["x-id"][0]`. During unknown-tracking
//! evaluation the driver threads the attribute of every identifier, select,
//! and index expression and matches it against the evaluation's
//! [`AttributePattern`]s; a hit turns the sub-expression into an unknown
//! carrying the matched attribute as its witness.

use std::fmt::{self, Display, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{EvalError, EvalResult};

/// One step in an attribute path: a field name, map key, or list index.
///
/// Wildcards are not qualifiers; they exist only in [`AttributePattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Qualifier {
    /// Field name or string map key.
    String(Arc<str>),
    /// Signed integer map key or list index.
    Int(i64),
    /// Unsigned integer map key or list index.
    Uint(u64),
    /// Boolean map key.
    Bool(bool),
}

impl Qualifier {
    /// True when the qualifier is a string that is also a legal identifier.
    #[must_use]
    fn is_identifier(&self) -> bool {
        match self {
            Self::String(s) => is_identifier(s),
            _ => false,
        }
    }

    fn fmt_step(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::String(s) if is_identifier(s) => write!(f, ".{s}"),
            Self::String(s) => write!(f, "[{s:?}]"),
            Self::Int(i) => write!(f, "[{i}]"),
            Self::Uint(u) => write!(f, "[{u}u]"),
            Self::Bool(b) => write!(f, "[{b}]"),
        }
    }
}

impl From<&str> for Qualifier {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<i64> for Qualifier {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Qualifier {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<bool> for Qualifier {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A concrete, non-empty path of qualifiers rooted at an identifier.
///
/// The first qualifier is always a string holding a legal identifier; the
/// constructors enforce this so downstream matching never re-validates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    qualifiers: SmallVec<[Qualifier; 4]>,
}

impl Attribute {
    /// Creates a single-element attribute from a root identifier.
    pub fn root(name: &str) -> EvalResult<Self> {
        if !is_identifier(name) {
            return Err(EvalError::invalid_argument(format!(
                "attribute root '{name}' is not a legal identifier"
            )));
        }
        Ok(Self {
            qualifiers: SmallVec::from_iter([Qualifier::from(name)]),
        })
    }

    /// Parses a dotted identifier such as `a.b.c` into string qualifiers.
    ///
    /// Every segment must be a legal identifier.
    pub fn from_qualified_identifier(qualified: &str) -> EvalResult<Self> {
        let mut segments = qualified.split('.');
        let mut attr = Self::root(segments.next().unwrap_or_default())?;
        for segment in segments {
            if !is_identifier(segment) {
                return Err(EvalError::invalid_argument(format!(
                    "attribute segment '{segment}' is not a legal identifier"
                )));
            }
            attr.qualifiers.push(Qualifier::from(segment));
        }
        Ok(attr)
    }

    /// Returns a new attribute extended by one qualifier.
    #[must_use]
    pub fn qualify(&self, qualifier: Qualifier) -> Self {
        let mut qualifiers = self.qualifiers.clone();
        qualifiers.push(qualifier);
        Self { qualifiers }
    }

    /// The qualifier path, root first.
    #[must_use]
    pub fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.qualifiers.len()
    }

    /// Always false: the constructors guarantee at least the root qualifier.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.qualifiers.is_empty()
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Qualifier::String(root) = &self.qualifiers[0] else {
            return Err(fmt::Error);
        };
        f.write_str(root)?;
        for q in &self.qualifiers[1..] {
            q.fmt_step(f)?;
        }
        Ok(())
    }
}

/// One step in a pattern: either an exact qualifier or a wildcard matching
/// any single qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternQualifier {
    Exact(Qualifier),
    Wildcard,
}

impl PatternQualifier {
    fn matches(&self, qualifier: &Qualifier) -> bool {
        match self {
            Self::Exact(q) => q == qualifier,
            Self::Wildcard => true,
        }
    }
}

/// An attribute path that may contain wildcards, used to declare which inputs
/// are unknown for a given evaluation.
///
/// A pattern matches an attribute elementwise at equal length; an attribute
/// that is a strict prefix of a potential match is a *partial* match, which
/// lets container accesses beneath the prefix resolve to unknowns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePattern {
    qualifiers: SmallVec<[PatternQualifier; 4]>,
}

impl AttributePattern {
    /// Creates a single-element pattern from a root identifier.
    pub fn root(name: &str) -> EvalResult<Self> {
        Attribute::root(name).map(Self::from)
    }

    /// Parses a dotted identifier such as `a.b.c` into an exact pattern.
    pub fn from_qualified_identifier(qualified: &str) -> EvalResult<Self> {
        Attribute::from_qualified_identifier(qualified).map(Self::from)
    }

    /// Returns a new pattern extended by one exact qualifier.
    #[must_use]
    pub fn qualify(&self, qualifier: Qualifier) -> Self {
        let mut qualifiers = self.qualifiers.clone();
        qualifiers.push(PatternQualifier::Exact(qualifier));
        Self { qualifiers }
    }

    /// Returns a new pattern extended by a wildcard step.
    #[must_use]
    pub fn wildcard(&self) -> Self {
        let mut qualifiers = self.qualifiers.clone();
        qualifiers.push(PatternQualifier::Wildcard);
        Self { qualifiers }
    }

    /// True when the attribute matches this pattern exactly: same length,
    /// every qualifier equal or covered by a wildcard.
    #[must_use]
    pub fn is_match(&self, attribute: &Attribute) -> bool {
        self.qualifiers.len() == attribute.len()
            && self
                .qualifiers
                .iter()
                .zip(attribute.qualifiers())
                .all(|(p, q)| p.matches(q))
    }

    /// True when the attribute is a strict prefix of some instance matching
    /// this pattern.
    #[must_use]
    pub fn is_partial_match(&self, attribute: &Attribute) -> bool {
        attribute.len() < self.qualifiers.len()
            && self
                .qualifiers
                .iter()
                .zip(attribute.qualifiers())
                .all(|(p, q)| p.matches(q))
    }

    /// Produces the concrete attribute to report as the unknown witness for a
    /// matched attribute.
    ///
    /// The witness takes the attribute's own qualifiers (which are concrete)
    /// truncated to the pattern's length, so wildcard steps are reported with
    /// the qualifier that actually hit them.
    #[must_use]
    pub fn simplify(&self, attribute: &Attribute) -> Attribute {
        Attribute {
            qualifiers: attribute.qualifiers()[..self.qualifiers.len().min(attribute.len())]
                .iter()
                .cloned()
                .collect(),
        }
    }
}

impl From<Attribute> for AttributePattern {
    fn from(attribute: Attribute) -> Self {
        Self {
            qualifiers: attribute.qualifiers.into_iter().map(PatternQualifier::Exact).collect(),
        }
    }
}

impl Display for AttributePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, q) in self.qualifiers.iter().enumerate() {
            match q {
                PatternQualifier::Exact(q) if idx == 0 && q.is_identifier() => {
                    let Qualifier::String(root) = q else { unreachable!() };
                    f.write_str(root)?;
                }
                PatternQualifier::Exact(q) => q.fmt_step(f)?,
                PatternQualifier::Wildcard => f.write_str("[*]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(path: &str) -> Attribute {
        Attribute::from_qualified_identifier(path).unwrap()
    }

    #[test]
    fn match_requires_equal_length() {
        let pattern = AttributePattern::from_qualified_identifier("a.b").unwrap();
        assert!(pattern.is_match(&attr("a.b")));
        assert!(!pattern.is_match(&attr("a")));
        assert!(!pattern.is_match(&attr("a.b.c")));
        assert!(!pattern.is_match(&attr("a.c")));
    }

    #[test]
    fn partial_match_is_strict_prefix() {
        let pattern = AttributePattern::from_qualified_identifier("a.b").unwrap();
        assert!(pattern.is_partial_match(&attr("a")));
        assert!(!pattern.is_partial_match(&attr("a.b")));
        assert!(!pattern.is_partial_match(&attr("b")));
    }

    #[test]
    fn wildcard_matches_any_single_qualifier() {
        let pattern = AttributePattern::root("m").unwrap().wildcard();
        assert!(pattern.is_match(&attr("m").qualify(Qualifier::Int(3))));
        assert!(pattern.is_match(&attr("m.x")));
        assert!(!pattern.is_match(&attr("m")));

        let witness = pattern.simplify(&attr("m").qualify(Qualifier::Int(3)));
        assert_eq!(witness.to_string(), "m[3]");
    }

    #[test]
    fn roots_must_be_identifiers() {
        assert!(Attribute::root("9x").is_err());
        assert!(Attribute::from_qualified_identifier("a..b").is_err());
        assert!(Attribute::root("_ok").is_ok());
    }

    #[test]
    fn display_quotes_non_identifier_keys() {
        let a = attr("req").qualify(Qualifier::from("x-id")).qualify(Qualifier::Uint(2));
        assert_eq!(a.to_string(), "req[\"x-id\"][2u]");
    }
}
