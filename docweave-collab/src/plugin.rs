//! Lifecycle plugin connecting an [`Editor`] to a [`CollabBinding`].

use crate::binding::{CollabBinding, SyncOutcome};
use crate::error::CollabError;
use crate::transport::UpdateTransport;
use docweave_core::editor::{Origin, Plugin};
use docweave_core::{Editor, EditorState, Transaction};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use tracing::warn;

pub const SYNC_PLUGIN_KEY: &str = "collab_sync";

/// A binding shared between its plugin and the code feeding remote updates.
pub type SharedBinding = Arc<Mutex<CollabBinding>>;

/// Forwards every local document change to the binding and tears the
/// binding down with the editor.
pub struct SyncPlugin {
    binding: SharedBinding,
    last_outcome: Option<SyncOutcome>,
}

impl SyncPlugin {
    pub fn new(binding: SharedBinding) -> Self {
        Self {
            binding,
            last_outcome: None,
        }
    }

    pub fn binding(&self) -> &SharedBinding {
        &self.binding
    }

    /// Outcome of the most recent local change.
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.last_outcome
    }
}

impl Plugin for SyncPlugin {
    fn key(&self) -> &str {
        SYNC_PLUGIN_KEY
    }

    fn apply(&mut self, tr: &Transaction, _old: &EditorState, new: &EditorState) -> Option<Transaction> {
        if tr.origin() == Origin::Remote || !tr.doc_changed() {
            return None;
        }
        match self.binding.lock().apply_local_change(tr, new.doc()) {
            Ok(outcome) => self.last_outcome = Some(outcome),
            Err(err) => warn!(%err, "Local change not synced"),
        }
        None
    }

    fn destroy(&mut self) {
        self.binding.lock().teardown();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Bind `binding` to `transport` for `editor` and install the sync plugin.
/// Existing shared content replaces the editor's document.
pub fn attach(
    editor: &mut Editor,
    binding: SharedBinding,
    transport: Arc<dyn UpdateTransport>,
) -> Result<(), CollabError> {
    let adopted = binding.lock().bind(editor.state(), transport)?;
    editor.add_plugin(Box::new(SyncPlugin::new(binding)));
    if let Some(tr) = adopted {
        editor.dispatch(tr)?;
    }
    Ok(())
}

/// Import a collaborator's update into `binding` and apply the result to
/// `editor`. Returns whether the editor's document changed.
pub fn apply_remote_update(editor: &mut Editor, binding: &SharedBinding, update: &[u8]) -> Result<bool, CollabError> {
    let tr = binding.lock().on_remote_change(update, editor.state())?;
    match tr {
        Some(tr) => {
            editor.dispatch(tr)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
