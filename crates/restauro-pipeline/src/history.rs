//! Editable filter chain with undo/redo.
//!
//! The chain is a plain list of [`FilterSpec`]s plus a stack of specs
//! removed by [`undo`](FilterChain::undo). It never runs anything: after
//! each edit the caller hands [`specs`](FilterChain::specs) to the
//! executor (or supervisor) and replays the whole pipeline.

use serde::{Deserialize, Serialize};

use crate::registry::FilterSpec;

/// The applied filter list and its redo stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    applied: Vec<FilterSpec>,
    undone: Vec<FilterSpec>,
}

impl FilterChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain starting from a loaded pipeline, with nothing to redo.
    #[must_use]
    pub const fn from_specs(specs: Vec<FilterSpec>) -> Self {
        Self {
            applied: specs,
            undone: Vec::new(),
        }
    }

    /// Append a filter.
    ///
    /// The redo stack is left alone, so a later [`redo`](Self::redo)
    /// still brings back filters undone before this push.
    pub fn push(&mut self, spec: FilterSpec) {
        self.applied.push(spec);
    }

    /// Remove and return the filter at `index`, or `None` if out of
    /// range. Removal is not undoable.
    pub fn remove(&mut self, index: usize) -> Option<FilterSpec> {
        (index < self.applied.len()).then(|| self.applied.remove(index))
    }

    /// Move the last applied filter onto the redo stack. Returns `false`
    /// if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(spec) = self.applied.pop() else {
            return false;
        };
        self.undone.push(spec);
        true
    }

    /// Re-apply the most recently undone filter. Returns `false` if
    /// there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(spec) = self.undone.pop() else {
            return false;
        };
        self.applied.push(spec);
        true
    }

    /// Clear the applied filters. The redo stack is kept.
    pub fn reset(&mut self) {
        self.applied.clear();
    }

    /// The applied filters in application order.
    #[must_use]
    pub fn specs(&self) -> &[FilterSpec] {
        &self.applied
    }

    /// Number of filters that [`redo`](Self::redo) can bring back.
    #[must_use]
    pub const fn redo_depth(&self) -> usize {
        self.undone.len()
    }
}
