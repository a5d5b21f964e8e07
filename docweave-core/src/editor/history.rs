//! Undo/redo stacks of inverse steps.

use super::state::{EditorState, Selection};
use super::transaction::{HistoryAction, Step, Transaction};
use tracing::debug;

const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone)]
struct HistoryEntry {
    /// Steps that revert one transaction, in application order.
    steps: Vec<Step>,
    /// Selection before the reverted transaction.
    selection: Selection,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    done: Vec<HistoryEntry>,
    undone: Vec<HistoryEntry>,
}

impl History {
    pub fn undo_depth(&self) -> usize {
        self.done.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }

    /// Record a local change. Clears the redo stack.
    pub(crate) fn record(&mut self, inverse: Vec<Step>, selection_before: Selection) {
        self.done.push(HistoryEntry {
            steps: inverse,
            selection: selection_before,
        });
        if self.done.len() > MAX_DEPTH {
            self.done.remove(0);
        }
        self.undone.clear();
    }

    /// Move the top entry between stacks once an undo or redo applied.
    pub(crate) fn apply_action(&mut self, action: HistoryAction, inverse: Vec<Step>, selection_before: Selection) {
        let (from, to) = match action {
            HistoryAction::Undo => (&mut self.done, &mut self.undone),
            HistoryAction::Redo => (&mut self.undone, &mut self.done),
        };
        from.pop();
        to.push(HistoryEntry {
            steps: inverse,
            selection: selection_before,
        });
    }
}

fn build(state: &EditorState, action: HistoryAction) -> Option<Transaction> {
    let history = state.history();
    let entry = match action {
        HistoryAction::Undo => history.done.last(),
        HistoryAction::Redo => history.undone.last(),
    }?;
    let mut tr = state.tr();
    for step in &entry.steps {
        if let Err(err) = tr.step(step.clone()) {
            debug!(action = action.as_str(), %err, "History entry no longer applies");
            return None;
        }
    }
    tr.set_selection(entry.selection.clone());
    tr.set_history_action(action);
    Some(tr)
}

/// Transaction reverting the most recent local change.
pub fn undo(state: &EditorState) -> Option<Transaction> {
    build(state, HistoryAction::Undo)
}

/// Transaction re-applying the most recently undone change.
pub fn redo(state: &EditorState) -> Option<Transaction> {
    build(state, HistoryAction::Redo)
}
