//! # Undo/Redo Stack
//!
//! Tracks committed delta batches for undo/redo.
//!
//! ## Design
//!
//! - Each committed batch is stored with its literal inverse
//! - Undo applies the inverse and moves the batch to the redo stack
//! - Redo reapplies the forward deltas
//! - New commits clear the redo stack
//! - Macros group several commits into one undo step

use crate::delta::{inverse_batch, Delta};

/// Deltas that are undone/redone together
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaBatch {
    /// Forward deltas in application order
    pub deltas: Vec<Delta>,

    /// Inverse deltas in application order for undo
    pub inverses: Vec<Delta>,

    pub description: Option<String>,
}

impl DeltaBatch {
    pub fn from_deltas(deltas: Vec<Delta>) -> Self {
        let inverses = inverse_batch(&deltas);
        Self {
            deltas,
            inverses,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    fn absorb(&mut self, batch: DeltaBatch) {
        self.deltas.extend(batch.deltas);
        let mut inverses = batch.inverses;
        inverses.append(&mut self.inverses);
        self.inverses = inverses;
    }
}

#[derive(Debug)]
pub struct UndoStack {
    /// Most recent last
    undo_stack: Vec<DeltaBatch>,

    /// Most recent last
    redo_stack: Vec<DeltaBatch>,

    /// 0 = unlimited
    max_levels: usize,

    /// Open macro
    current_batch: Option<DeltaBatch>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Record a committed batch, folding it into the open macro if any
    pub fn record(&mut self, batch: DeltaBatch) {
        if batch.is_empty() {
            return;
        }
        match &mut self.current_batch {
            Some(current) => {
                current.absorb(batch);
                self.redo_stack.clear();
            }
            None => self.push_batch(batch),
        }
    }

    pub fn begin_batch(&mut self) {
        if self.current_batch.is_none() {
            self.current_batch = Some(DeltaBatch::from_deltas(Vec::new()));
        }
    }

    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.is_empty() {
                self.push_batch(batch);
            }
        }
    }

    pub fn in_batch(&self) -> bool {
        self.current_batch.is_some()
    }

    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    fn push_batch(&mut self, batch: DeltaBatch) {
        self.undo_stack.push(batch);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    /// Take the next batch to undo
    pub fn take_undo(&mut self) -> Option<DeltaBatch> {
        self.undo_stack.pop()
    }

    pub fn take_redo(&mut self) -> Option<DeltaBatch> {
        self.redo_stack.pop()
    }

    /// File a batch whose inverse was just applied
    pub fn push_undone(&mut self, batch: DeltaBatch) {
        self.redo_stack.push(batch);
    }

    /// File a batch that was just redone, keeping the rest of the redo stack
    pub fn push_redone(&mut self, batch: DeltaBatch) {
        self.undo_stack.push(batch);
    }

    /// Put back a batch whose undo failed
    pub fn restore_undo(&mut self, batch: DeltaBatch) {
        self.undo_stack.push(batch);
    }

    pub fn restore_redo(&mut self, batch: DeltaBatch) {
        self.redo_stack.push(batch);
    }

    /// Forget the most recent record of `deltas`, which is being rolled back
    pub fn discard_recorded(&mut self, deltas: &[Delta]) -> bool {
        if deltas.is_empty() {
            return true;
        }
        if let Some(current) = &mut self.current_batch {
            if current.deltas.ends_with(deltas) {
                let keep = current.deltas.len() - deltas.len();
                current.deltas.truncate(keep);
                current.inverses.drain(..deltas.len());
                return true;
            }
        }
        if self.undo_stack.last().is_some_and(|batch| batch.deltas == deltas) {
            self.undo_stack.pop();
            return true;
        }
        false
    }

    /// Move the most recently undone batch back onto the undo stack
    pub fn reverse_undo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(batch) => {
                self.undo_stack.push(batch);
                true
            }
            None => false,
        }
    }

    /// Move the most recently redone batch back onto the redo stack
    pub fn reverse_redo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(batch) => {
                self.redo_stack.push(batch);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty() || self.current_batch.as_ref().is_some_and(|b| !b.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use massing_graph::GraphKind;

    fn batch(graph_id: i32) -> DeltaBatch {
        DeltaBatch::from_deltas(vec![Delta::add_graph(graph_id, GraphKind::Volume)])
    }

    #[test]
    fn test_undo_stack_creation() {
        let stack = UndoStack::new();
        assert_eq!(stack.undo_levels(), 0);
        assert_eq!(stack.redo_levels(), 0);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_macro_groups_batches() {
        let mut stack = UndoStack::new();
        stack.begin_batch();
        stack.set_batch_description("Draw room");
        stack.record(batch(1));
        stack.record(batch(2));
        stack.end_batch();

        assert_eq!(stack.undo_levels(), 1);
        assert_eq!(stack.undo_description(), Some("Draw room"));

        let taken = stack.take_undo().unwrap();
        assert_eq!(taken.deltas.len(), 2);
        // Second batch is undone first
        assert_eq!(taken.inverses[0], Delta::remove_graph(2, GraphKind::Volume));
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut stack = UndoStack::new();
        stack.record(batch(1));
        let undone = stack.take_undo().unwrap();
        stack.push_undone(undone);
        assert_eq!(stack.redo_levels(), 1);

        stack.record(batch(2));
        assert_eq!(stack.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut stack = UndoStack::with_max_levels(2);
        for id in 1..=3 {
            stack.record(batch(id));
        }
        assert_eq!(stack.undo_levels(), 2);
    }

    #[test]
    fn test_discard_recorded_inside_macro() {
        let mut stack = UndoStack::new();
        stack.begin_batch();
        stack.record(batch(1));
        let second = batch(2);
        stack.record(second.clone());

        assert!(stack.discard_recorded(&second.deltas));
        stack.end_batch();
        let remaining = stack.take_undo().unwrap();
        assert_eq!(remaining, batch(1));
    }
}
