//! The evaluator's internal scope stack for comprehension bindings.
//!
//! Each comprehension (and `cel.bind`-shaped binding) pushes a frame holding
//! its iteration and accumulator slots. Frames shadow the per-evaluation
//! resolver and each other; lookups walk from the innermost frame outward.
//!
//! # Lazy slots
//!
//! A bind-shaped comprehension declares its accumulator as a *lazy* slot:
//! the initializer runs only when the body first reads the name, and the
//! computed result is cached at the frame that declared the slot — not at
//! whatever nested frame happened to trigger the read — so a value produced
//! inside an inner loop iteration is visible to every later reference in the
//! binding's scope. Cached results hold only frozen, immutable data
//! (unknowns are frozen `UnknownSet`s before they can be cached), so handing
//! out clones cannot leak cross-iteration mutation.

use std::sync::Arc;

use ahash::AHashMap;

use crate::interp::IntermediateResult;

#[derive(Debug, Clone)]
enum Slot {
    Bound(IntermediateResult),
    /// Declared but not yet computed (`None`), or computed and cached.
    Lazy(Option<IntermediateResult>),
}

/// Outcome of a scope lookup.
#[derive(Debug)]
pub(crate) enum ScopeLookup {
    /// The name is bound (or lazily cached) to this result.
    Found(IntermediateResult),
    /// The name is a declared lazy slot whose initializer has not run yet.
    /// The caller must evaluate it and store the result via `cache_lazy`.
    Pending,
    /// No frame binds the name; fall through to the resolver.
    Absent,
}

#[derive(Debug, Default)]
struct ScopeFrame {
    slots: AHashMap<Arc<str>, Slot>,
}

/// Stack of comprehension scope frames.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(ScopeFrame::default());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    /// Binds (or rebinds) a name in the innermost frame.
    ///
    /// # Panics
    /// Panics if no frame has been pushed; the driver always brackets
    /// comprehension evaluation with `push`/`pop`.
    pub(crate) fn bind(&mut self, name: &Arc<str>, result: IntermediateResult) {
        self.frames
            .last_mut()
            .expect("bind called outside a comprehension scope")
            .slots
            .insert(name.clone(), Slot::Bound(result));
    }

    /// Declares a lazy slot in the innermost frame.
    pub(crate) fn declare_lazy(&mut self, name: &Arc<str>) {
        self.frames
            .last_mut()
            .expect("declare_lazy called outside a comprehension scope")
            .slots
            .insert(name.clone(), Slot::Lazy(None));
    }

    /// Looks a name up from the innermost frame outward.
    pub(crate) fn lookup(&self, name: &str) -> ScopeLookup {
        for frame in self.frames.iter().rev() {
            match frame.slots.get(name) {
                Some(Slot::Bound(result)) | Some(Slot::Lazy(Some(result))) => {
                    return ScopeLookup::Found(result.clone());
                }
                Some(Slot::Lazy(None)) => return ScopeLookup::Pending,
                None => {}
            }
        }
        ScopeLookup::Absent
    }

    /// Caches a computed lazy value at the frame that declared the slot.
    ///
    /// Walks outward from the innermost frame so the value lands at the
    /// declaring scope even when the read that forced it happened inside a
    /// nested comprehension.
    pub(crate) fn cache_lazy(&mut self, name: &str, result: IntermediateResult) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.slots.get_mut(name) {
                *slot = Slot::Lazy(Some(result));
                return;
            }
        }
    }

}
