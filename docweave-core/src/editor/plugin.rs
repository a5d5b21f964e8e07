//! Lifecycle plugins attached to an editing session.

use super::state::EditorState;
use super::transaction::Transaction;
use std::any::Any;

/// Per-session plugin. `apply` sees every transaction after it has been
/// applied and may return a follow-up transaction, which the editor queues
/// behind the current dispatch.
pub trait Plugin: Send {
    fn key(&self) -> &str;

    fn init(&mut self, state: &EditorState) {
        let _ = state;
    }

    fn apply(&mut self, tr: &Transaction, old: &EditorState, new: &EditorState) -> Option<Transaction> {
        let _ = (tr, old, new);
        None
    }

    fn destroy(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}
