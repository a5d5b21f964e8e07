//! Editor state: document, selection, history and editability.

use super::history::History;
use super::transaction::{Origin, Transaction};
use crate::error::EditorError;
use crate::model::{inline, Mark, Node};
use crate::schema::Schema;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// A point inside a textblock: the path of child indices from the root to
/// the textblock, plus an inline offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub path: Vec<usize>,
    pub offset: usize,
}

impl Position {
    pub fn new(path: Vec<usize>, offset: usize) -> Self {
        Self { path, offset }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path
            .cmp(&other.path)
            .then(self.offset.cmp(&other.offset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub anchor: Position,
    pub head: Position,
}

impl Selection {
    pub fn new(anchor: Position, head: Position) -> Self {
        Self { anchor, head }
    }

    pub fn cursor(position: Position) -> Self {
        Self {
            anchor: position.clone(),
            head: position,
        }
    }

    pub fn from(&self) -> &Position {
        std::cmp::min(&self.anchor, &self.head)
    }

    pub fn to(&self) -> &Position {
        std::cmp::max(&self.anchor, &self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    /// Whether both ends lie in the same textblock.
    pub fn is_in_one_block(&self) -> bool {
        self.anchor.path == self.head.path
    }

    pub fn at_start(doc: &Node, schema: &Schema) -> Self {
        let path = first_textblock(doc, schema).unwrap_or_default();
        Self::cursor(Position::new(path, 0))
    }

    pub fn at_end(doc: &Node, schema: &Schema) -> Self {
        let path = last_textblock(doc, schema).unwrap_or_default();
        let offset = doc
            .node_at(&path)
            .map(|n| inline::content_size(n.content()))
            .unwrap_or(0);
        Self::cursor(Position::new(path, offset))
    }

    pub fn all(doc: &Node, schema: &Schema) -> Self {
        Self::new(
            Self::at_start(doc, schema).head,
            Self::at_end(doc, schema).head,
        )
    }
}

/// Paths of every textblock in document order.
pub fn textblocks(doc: &Node, schema: &Schema) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    doc.descendants(&mut |node, path| {
        if schema.is_textblock(node.node_type()) && !schema.is_inline(node.node_type()) {
            out.push(path.to_vec());
        }
    });
    out
}

pub fn first_textblock(doc: &Node, schema: &Schema) -> Option<Vec<usize>> {
    textblocks(doc, schema).into_iter().next()
}

pub fn last_textblock(doc: &Node, schema: &Schema) -> Option<Vec<usize>> {
    textblocks(doc, schema).into_iter().last()
}

#[derive(Debug, Clone)]
pub struct EditorState {
    schema: Arc<Schema>,
    doc: Node,
    selection: Selection,
    stored_marks: Option<Vec<Mark>>,
    history: History,
    editable: bool,
    version: u64,
}

impl EditorState {
    pub fn new(schema: Arc<Schema>, doc: Node) -> Self {
        let selection = Selection::at_start(&doc, &schema);
        Self {
            schema,
            doc,
            selection,
            stored_marks: None,
            history: History::default(),
            editable: true,
            version: 0,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn stored_marks(&self) -> Option<&[Mark]> {
        self.stored_marks.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = self.clamp_selection(selection);
        self
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Start a transaction against this state.
    pub fn tr(&self) -> Transaction {
        Transaction::new(
            self.schema.clone(),
            self.doc.clone(),
            self.version,
            self.selection.clone(),
        )
    }

    /// The textblock holding the selection head.
    pub fn head_block(&self) -> Option<&Node> {
        self.doc.node_at(&self.selection.head.path)
    }

    /// Marks that text typed at the cursor would receive.
    pub fn marks_at_cursor(&self) -> Vec<Mark> {
        if let Some(marks) = &self.stored_marks {
            return marks.clone();
        }
        let head = &self.selection.head;
        let Some(block) = self.doc.node_at(&head.path) else {
            return Vec::new();
        };
        inline::marks_at(block.content(), head.offset)
            .into_iter()
            .filter(|m| {
                self.schema
                    .mark_type(m.mark_type())
                    .is_some_and(|t| t.spec().inclusive)
            })
            .collect()
    }

    /// Whether the cursor sits in code: a code block or a code mark.
    pub fn in_code(&self) -> bool {
        let Some(block) = self.head_block() else {
            return false;
        };
        if self.schema.is_code(block.node_type()) {
            return true;
        }
        inline::marks_at(block.content(), self.selection.head.offset)
            .iter()
            .any(|m| self.schema.mark_type(m.mark_type()).is_some_and(|t| t.spec().code))
    }

    /// Produce the state that results from applying `tr`.
    pub fn apply(&self, tr: &Transaction) -> Result<EditorState, EditorError> {
        let (doc, inverse) = if tr.base_version() == self.version {
            (tr.doc().clone(), tr.inverted_steps())
        } else {
            // Computed against an older state: replay the steps here.
            let mut doc = self.doc.clone();
            let mut inverse = Vec::with_capacity(tr.steps().len());
            for step in tr.steps() {
                let (next, inverted) = step.apply(&self.schema, &doc)?;
                doc = next;
                inverse.push(inverted);
            }
            inverse.reverse();
            (doc, inverse)
        };

        let changed = !tr.steps().is_empty();
        let selection = match tr.selection_override() {
            Some(selection) => selection.clone(),
            None => {
                let mut selection = self.selection.clone();
                for step in tr.steps() {
                    selection = Selection::new(
                        step.map_position(&selection.anchor),
                        step.map_position(&selection.head),
                    );
                }
                selection
            }
        };

        let mut history = self.history.clone();
        match (tr.origin(), tr.history_action()) {
            (Origin::History, Some(action)) => {
                history.apply_action(action, inverse, self.selection.clone())
            }
            _ if changed && tr.adds_to_history() && tr.origin() == Origin::Local => {
                history.record(inverse, self.selection.clone())
            }
            _ => {}
        }

        let stored_marks = match tr.stored_marks_override() {
            Some(marks) => marks.clone(),
            None if changed || tr.selection_override().is_some() => None,
            None => self.stored_marks.clone(),
        };

        let mut next = EditorState {
            schema: self.schema.clone(),
            doc,
            selection,
            stored_marks,
            history,
            editable: self.editable,
            version: if changed { self.version + 1 } else { self.version },
        };
        next.selection = next.clamp_selection(next.selection.clone());
        Ok(next)
    }

    /// Move selection ends that no longer point into a textblock to the
    /// nearest valid position.
    fn clamp_selection(&self, selection: Selection) -> Selection {
        Selection::new(self.clamp(selection.anchor), self.clamp(selection.head))
    }

    fn clamp(&self, position: Position) -> Position {
        if let Some(node) = self.doc.node_at(&position.path) {
            if self.schema.is_textblock(node.node_type()) && !self.schema.is_inline(node.node_type()) {
                let size = inline::content_size(node.content());
                return Position::new(position.path, position.offset.min(size));
            }
        }
        let blocks = textblocks(&self.doc, &self.schema);
        match blocks.iter().find(|p| **p >= position.path) {
            Some(path) => Position::new(path.clone(), 0),
            None => match blocks.last() {
                Some(path) => {
                    let size = self
                        .doc
                        .node_at(path)
                        .map(|n| inline::content_size(n.content()))
                        .unwrap_or(0);
                    Position::new(path.clone(), size)
                }
                None => Position::new(Vec::new(), 0),
            },
        }
    }
}
