//! Binding between an editing session's document and a Loro document.
//!
//! The Loro document is owned by the replication service; the binding only
//! reads and writes it. Layout:
//! - "blocks" (LoroList): top-level block ids in document order
//! - "content" (LoroMap): block id -> block shape, the block JSON with
//!   inline content replaced by text snapshots and formatting runs
//! - "texts" (LoroMap): "{block id}/{k}" -> text of the k-th textblock
//! - "actors" (LoroMap): peer id -> actor that edited from that peer
//!
//! Local changes are diffed against the shared blocks at the top level:
//! blocks paired inside the changed range are updated in place, the rest
//! are inserted or deleted. Text is spliced per character into mergeable
//! text containers, so concurrent typing in one paragraph keeps both
//! edits. Formatting and attributes of a block resolve last-writer-wins.

use crate::error::CollabError;
use crate::shape;
use crate::transport::UpdateTransport;
use docweave_core::editor::Origin;
use docweave_core::{EditorState, Node, Schema, Transaction};
use loro::{Container, ExportMode, LoroDoc, LoroText, ValueOrContainer, VersionVector};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BLOCKS: &str = "blocks";
const CONTENT: &str = "content";
const TEXTS: &str = "texts";
const ACTORS: &str = "actors";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Bound,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing needed propagating.
    Unchanged,
    Sent,
    /// Kept local; propagation waits for [`CollabBinding::rebind`].
    Deferred,
}

/// Range that differs between two sequences after trimming the common
/// prefix and suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChangedRange {
    pub start: usize,
    pub old_end: usize,
    pub new_end: usize,
}

pub(crate) fn changed_range<T: PartialEq>(old: &[T], new: &[T]) -> Option<ChangedRange> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    if prefix == old.len() && prefix == new.len() {
        return None;
    }
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();
    Some(ChangedRange {
        start: prefix,
        old_end: old.len() - suffix,
        new_end: new.len() - suffix,
    })
}

fn block_key(node: &Node) -> String {
    node.to_json().to_string()
}

fn text_key(id: &str, k: usize) -> String {
    format!("{id}/{k}")
}

/// Rewrite `text` to `value` with a single splice over the differing
/// characters.
fn splice_text(text: &LoroText, value: &str) -> Result<(), CollabError> {
    let old: Vec<char> = text.to_string().chars().collect();
    let new: Vec<char> = value.chars().collect();
    if let Some(range) = changed_range(&old, &new) {
        let inserted: String = new[range.start..range.new_end].iter().collect();
        text.splice(range.start, range.old_end - range.start, &inserted)?;
    }
    Ok(())
}

fn as_string(value: Option<ValueOrContainer>) -> Option<String> {
    if let Some(ValueOrContainer::Value(loro_val)) = value {
        if let Some(s) = loro_val.as_string() {
            return Some(s.to_string());
        }
    }
    None
}

pub struct CollabBinding {
    doc: Arc<LoroDoc>,
    schema: Arc<Schema>,
    actor: String,
    state: BindingState,
    transport: Option<Arc<dyn UpdateTransport>>,
    /// Oplog version last handed to the transport.
    sent: VersionVector,
    /// Local edits not yet written to the shared document.
    pending: bool,
    actor_recorded: bool,
}

impl CollabBinding {
    pub fn new(doc: Arc<LoroDoc>, schema: Arc<Schema>, actor: impl Into<String>) -> Self {
        Self {
            doc,
            schema,
            actor: actor.into(),
            state: BindingState::Unbound,
            transport: None,
            sent: VersionVector::default(),
            pending: false,
            actor_recorded: false,
        }
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn doc(&self) -> &Arc<LoroDoc> {
        &self.doc
    }

    /// Whether local edits are waiting for a rebind.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Peer id to actor attribution recorded in the shared document.
    pub fn actors(&self) -> BTreeMap<String, String> {
        let mut actors = BTreeMap::new();
        self.doc.get_map(ACTORS).for_each(|peer, value| {
            if let Some(actor) = as_string(Some(value)) {
                actors.insert(peer.to_string(), actor);
            }
        });
        actors
    }

    fn block_ids(&self) -> Vec<String> {
        let blocks = self.doc.get_list(BLOCKS);
        (0..blocks.len()).filter_map(|i| as_string(blocks.get(i))).collect()
    }

    fn block_shape(&self, id: &str) -> Option<String> {
        as_string(self.doc.get_map(CONTENT).get(id))
    }

    fn shared_text(&self, id: &str, k: usize) -> Option<String> {
        match self.doc.get_map(TEXTS).get(&text_key(id, k))? {
            ValueOrContainer::Container(Container::Text(text)) => Some(text.to_string()),
            ValueOrContainer::Value(value) => value.as_string().map(|s| s.to_string()),
            _ => None,
        }
    }

    fn shared_block(&self, id: &str) -> Option<Node> {
        let json = self.block_shape(id)?;
        let layout: Value = match serde_json::from_str(&json) {
            Ok(layout) => layout,
            Err(err) => {
                warn!(block = %id, %err, "Skipping undecodable shared block");
                return None;
            }
        };
        let value = shape::join(&layout, &mut |k: usize| self.shared_text(id, k));
        match self.schema.node_from_json(&value) {
            Ok(node) => Some(node),
            Err(err) => {
                warn!(block = %id, %err, "Skipping shared block rejected by schema");
                None
            }
        }
    }

    /// Top-level blocks currently in the shared document. Blocks that fail
    /// to decode against the schema are skipped.
    pub fn shared_blocks(&self) -> Vec<Node> {
        self.block_ids().iter().filter_map(|id| self.shared_block(id)).collect()
    }

    fn ensure_bound(&self) -> Result<(), CollabError> {
        match self.state {
            BindingState::Bound => Ok(()),
            BindingState::Unbound => Err(CollabError::NotBound),
            BindingState::TornDown => Err(CollabError::TornDown),
        }
    }

    fn transport_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Bind to `transport`. An empty shared document is seeded from the
    /// local tree; otherwise its content is adopted through the returned
    /// remote transaction.
    pub fn bind(
        &mut self,
        local: &EditorState,
        transport: Arc<dyn UpdateTransport>,
    ) -> Result<Option<Transaction>, CollabError> {
        match self.state {
            BindingState::Unbound => {}
            BindingState::Bound => return Err(CollabError::AlreadyBound),
            BindingState::TornDown => return Err(CollabError::TornDown),
        }
        self.transport = Some(transport);
        self.state = BindingState::Bound;

        if self.block_ids().is_empty() {
            info!(actor = %self.actor, "Seeding shared document from local tree");
            // Seeding is not an edit and is not attributed to the actor.
            self.write_tree(local.doc())?;
            self.doc.commit();
            if self.transport_open() {
                self.flush()?;
            } else {
                self.pending = true;
            }
            return Ok(None);
        }

        info!(actor = %self.actor, blocks = self.block_ids().len(), "Adopting shared document");
        self.sent = self.doc.oplog_vv();
        self.remote_transaction(local)
    }

    /// Propagate a local change. `doc_after` is the document once the
    /// transaction has been applied.
    pub fn apply_local_change(&mut self, tr: &Transaction, doc_after: &Node) -> Result<SyncOutcome, CollabError> {
        self.ensure_bound()?;
        if tr.origin() == Origin::Remote || !tr.doc_changed() {
            return Ok(SyncOutcome::Unchanged);
        }
        if self.pending || !self.transport_open() {
            if !self.pending {
                warn!(actor = %self.actor, "Transport closed; keeping edits local until rebind");
            }
            self.pending = true;
            return Ok(SyncOutcome::Deferred);
        }
        if !self.write_tree(doc_after)? {
            return Ok(SyncOutcome::Unchanged);
        }
        self.record_actor()?;
        self.doc.commit();
        self.flush()
    }

    /// Import a collaborator's update. Returns the remote transaction that
    /// brings the local tree in line with the shared document, if any.
    pub fn on_remote_change(&mut self, update: &[u8], local: &EditorState) -> Result<Option<Transaction>, CollabError> {
        self.ensure_bound()?;
        self.doc.import(update)?;
        self.mark_imported();
        if self.pending {
            debug!("Remote update imported while local edits are pending");
            return Ok(None);
        }
        self.remote_transaction(local)
    }

    /// Attach a new transport and reconcile the full local tree into the
    /// shared document. Local blocks win over remote ones received while
    /// propagation was deferred.
    pub fn rebind(&mut self, transport: Arc<dyn UpdateTransport>, local: &Node) -> Result<SyncOutcome, CollabError> {
        self.ensure_bound()?;
        self.transport = Some(transport);
        if !self.transport_open() {
            self.pending = true;
            return Ok(SyncOutcome::Deferred);
        }
        let was_pending = std::mem::take(&mut self.pending);
        info!(actor = %self.actor, was_pending, "Rebound transport");
        if self.write_tree(local)? {
            self.record_actor()?;
        }
        self.doc.commit();
        self.flush()
    }

    /// Stop observing the shared document. Later calls fail.
    pub fn teardown(&mut self) {
        if self.state == BindingState::TornDown {
            return;
        }
        info!(actor = %self.actor, "Tearing down collaboration binding");
        self.transport = None;
        self.state = BindingState::TornDown;
    }

    fn remote_transaction(&self, local: &EditorState) -> Result<Option<Transaction>, CollabError> {
        let blocks = self.shared_blocks();
        if blocks.is_empty() {
            debug!("Shared document has no blocks; keeping local tree");
            return Ok(None);
        }
        let Some(range) = changed_range(local.doc().content(), &blocks) else {
            return Ok(None);
        };
        let mut tr = local.tr();
        tr.replace(
            Vec::new(),
            range.start,
            range.old_end,
            blocks[range.start..range.new_end].to_vec(),
        )?;
        tr.set_origin(Origin::Remote);
        debug!(from = range.start, to = range.old_end, "Applying remote blocks");
        Ok(Some(tr))
    }

    /// Write the top-level blocks of `doc` into the shared document.
    /// Returns whether anything changed.
    fn write_tree(&self, doc: &Node) -> Result<bool, CollabError> {
        let ids = self.block_ids();
        let old: Vec<String> = ids
            .iter()
            .map(|id| self.shared_block(id).map(|node| block_key(&node)).unwrap_or_default())
            .collect();
        let new: Vec<String> = doc.content().iter().map(block_key).collect();
        let Some(range) = changed_range(&old, &new) else {
            return Ok(false);
        };

        let blocks = self.doc.get_list(BLOCKS);
        let paired = (range.old_end - range.start).min(range.new_end - range.start);
        for at in range.start..range.start + paired {
            if old[at] != new[at] {
                self.write_block(&ids[at], &doc.content()[at])?;
            }
        }

        let removed: Range<usize> = range.start + paired..range.old_end;
        if !removed.is_empty() {
            blocks.delete(removed.start, removed.len())?;
            for id in &ids[removed] {
                self.delete_block(id)?;
            }
        }

        let peer = self.doc.peer_id();
        let base = self.doc.oplog_vv().get(&peer).copied().unwrap_or(0);
        let inserted = &doc.content()[range.start + paired..range.new_end];
        for (k, node) in inserted.iter().enumerate() {
            let id = format!("{peer}-{base}-{k}");
            self.write_block(&id, node)?;
            blocks.insert(range.start + paired + k, id)?;
        }
        debug!(
            updated = paired,
            inserted = inserted.len(),
            removed = range.old_end - range.start - paired,
            "Wrote local blocks"
        );
        Ok(true)
    }

    fn write_block(&self, id: &str, node: &Node) -> Result<(), CollabError> {
        let mut texts = Vec::new();
        let layout = shape::split(&self.schema, &node.to_json(), &mut texts).to_string();
        let content = self.doc.get_map(CONTENT);
        if self.block_shape(id).as_deref() != Some(layout.as_str()) {
            content.insert(id, layout.as_str())?;
        }
        let shared = self.doc.get_map(TEXTS);
        for (k, text) in texts.iter().enumerate() {
            let target = shared.ensure_mergeable_text(&text_key(id, k))?;
            splice_text(&target, text)?;
        }
        Ok(())
    }

    fn delete_block(&self, id: &str) -> Result<(), CollabError> {
        self.doc.get_map(CONTENT).delete(id)?;
        let texts = self.doc.get_map(TEXTS);
        let prefix = format!("{id}/");
        let mut keys = Vec::new();
        texts.for_each(|key, _| {
            if key.starts_with(&prefix) {
                keys.push(key.to_string());
            }
        });
        for key in keys {
            texts.delete(&key)?;
        }
        Ok(())
    }

    /// Imported operations came from collaborators and are never sent
    /// back; only this peer's own operations stay due.
    fn mark_imported(&mut self) {
        let mut imported = self.doc.oplog_vv();
        imported.remove(&self.doc.peer_id());
        self.sent.merge(&imported);
    }

    /// Attribute this peer's changes to the actor, once.
    fn record_actor(&mut self) -> Result<(), CollabError> {
        if self.actor_recorded {
            return Ok(());
        }
        let actors = self.doc.get_map(ACTORS);
        let peer = self.doc.peer_id().to_string();
        if actors.get(&peer).is_none() {
            actors.insert(&peer, self.actor.as_str())?;
            info!(peer = %peer, actor = %self.actor, "Recorded actor for peer");
        }
        self.actor_recorded = true;
        Ok(())
    }

    /// Send everything committed since the last delivery.
    fn flush(&mut self) -> Result<SyncOutcome, CollabError> {
        let current = self.doc.oplog_vv();
        if current == self.sent {
            return Ok(SyncOutcome::Unchanged);
        }
        let update = self
            .doc
            .export(ExportMode::updates(&self.sent))
            .map_err(|e| CollabError::Export(format!("{e:?}")))?;
        let Some(transport) = self.transport.as_ref() else {
            self.pending = true;
            return Ok(SyncOutcome::Deferred);
        };
        match transport.send(update) {
            Ok(()) => {
                self.sent = current;
                Ok(SyncOutcome::Sent)
            }
            Err(err) => {
                warn!(%err, "Update not delivered; deferring until rebind");
                self.pending = true;
                Ok(SyncOutcome::Deferred)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_have_no_changed_range() {
        assert_eq!(changed_range(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(changed_range::<i32>(&[], &[]), None);
    }

    #[test]
    fn changed_range_trims_prefix_and_suffix() {
        assert_eq!(
            changed_range(&[1, 2, 3, 4], &[1, 9, 4]),
            Some(ChangedRange {
                start: 1,
                old_end: 3,
                new_end: 2
            })
        );
        // Insertion between equal neighbours.
        assert_eq!(
            changed_range(&[1, 1], &[1, 1, 1]),
            Some(ChangedRange {
                start: 2,
                old_end: 2,
                new_end: 3
            })
        );
    }
}
