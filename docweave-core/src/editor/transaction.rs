//! Steps and transactions.
//!
//! A [`Step`] is an atomic, invertible change to the document. A
//! [`Transaction`] accumulates steps against a snapshot of the document,
//! tracking the selection as it goes, and is applied to an
//! [`EditorState`](super::EditorState) in one piece.

use super::state::{Position, Selection};
use crate::error::EditorError;
use crate::model::{inline, Attrs, Mark, Node};
use crate::schema::Schema;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Replace `from..to` of the node at `path`. Offsets are inline offsets
    /// when that node is a textblock and child indices otherwise.
    Replace {
        path: Vec<usize>,
        from: usize,
        to: usize,
        content: Vec<Node>,
    },
    SetAttrs {
        path: Vec<usize>,
        attrs: Attrs,
    },
}

impl Step {
    /// Apply to `doc`, returning the new document and the inverse step.
    pub fn apply(&self, schema: &Schema, doc: &Node) -> Result<(Node, Step), EditorError> {
        match self {
            Step::Replace {
                path,
                from,
                to,
                content,
            } => {
                let target = doc
                    .node_at(path)
                    .ok_or_else(|| EditorError::InvalidPath(path.clone()))?;
                let (new_content, removed, inserted) = if schema.is_textblock(target.node_type()) {
                    let size = inline::content_size(target.content());
                    if from > to || *to > size {
                        return Err(EditorError::RangeOutOfBounds {
                            from: *from,
                            to: *to,
                            len: size,
                        });
                    }
                    let removed = inline::slice(target.content(), *from, *to);
                    let inserted = inline::content_size(content);
                    (
                        inline::replace_range(target.content(), *from, *to, content.clone()),
                        removed,
                        inserted,
                    )
                } else {
                    let len = target.child_count();
                    if from > to || *to > len {
                        return Err(EditorError::RangeOutOfBounds {
                            from: *from,
                            to: *to,
                            len,
                        });
                    }
                    let mut children = target.content().to_vec();
                    let removed: Vec<Node> = children.splice(*from..*to, content.iter().cloned()).collect();
                    (children, removed, content.len())
                };
                let replaced = schema.replace_content(target, new_content)?;
                let doc = update_at(doc, path, replaced)?;
                let inverse = Step::Replace {
                    path: path.clone(),
                    from: *from,
                    to: from + inserted,
                    content: removed,
                };
                Ok((doc, inverse))
            }
            Step::SetAttrs { path, attrs } => {
                let target = doc
                    .node_at(path)
                    .ok_or_else(|| EditorError::InvalidPath(path.clone()))?;
                let old = target.attrs().clone();
                let replaced = schema.replace_attrs(target, attrs.clone())?;
                let doc = update_at(doc, path, replaced)?;
                Ok((
                    doc,
                    Step::SetAttrs {
                        path: path.clone(),
                        attrs: old,
                    },
                ))
            }
        }
    }

    /// Map a position in the document before this step to the document
    /// after it. Positions inside removed content collapse to the end of
    /// the inserted content.
    pub fn map_position(&self, position: &Position) -> Position {
        let Step::Replace {
            path,
            from,
            to,
            content,
        } = self
        else {
            return position.clone();
        };

        if position.path == *path {
            // Inline replace inside the position's own block.
            let inserted = inline::content_size(content);
            let offset = if position.offset < *from {
                position.offset
            } else if position.offset >= *to {
                position.offset - (to - from) + inserted
            } else {
                from + inserted
            };
            return Position::new(position.path.clone(), offset);
        }

        if position.path.len() > path.len() && position.path.starts_with(path) {
            let depth = path.len();
            let index = position.path[depth];
            let mut mapped = position.path.clone();
            if index >= *to {
                mapped[depth] = index - (to - from) + content.len();
                return Position::new(mapped, position.offset);
            }
            if index >= *from {
                // The containing block was replaced.
                mapped.truncate(depth + 1);
                mapped[depth] = *from;
                return Position::new(mapped, 0);
            }
        }
        position.clone()
    }
}

/// Replace the node at `path` inside `root`, rebuilding the ancestors.
fn update_at(root: &Node, path: &[usize], replacement: Node) -> Result<Node, EditorError> {
    let Some((&index, rest)) = path.split_first() else {
        return Ok(replacement);
    };
    let child = root
        .child(index)
        .ok_or_else(|| EditorError::InvalidPath(path.to_vec()))?;
    let updated = update_at(child, rest, replacement)?;
    let mut content = root.content().to_vec();
    content[index] = updated;
    Ok(root.with_content(content))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    Local,
    /// Changes imported from a collaborator; never recorded in history.
    Remote,
    /// Undo or redo.
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Undo => "undo",
            HistoryAction::Redo => "redo",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    schema: Arc<Schema>,
    base_version: u64,
    doc: Node,
    steps: Vec<Step>,
    inverted: Vec<Step>,
    selection: Selection,
    selection_set: bool,
    stored_marks: Option<Option<Vec<Mark>>>,
    meta: BTreeMap<String, Value>,
    add_to_history: bool,
    origin: Origin,
    history_action: Option<HistoryAction>,
}

impl Transaction {
    pub(crate) fn new(schema: Arc<Schema>, doc: Node, base_version: u64, selection: Selection) -> Self {
        Self {
            schema,
            base_version,
            doc,
            steps: Vec::new(),
            inverted: Vec::new(),
            selection,
            selection_set: false,
            stored_marks: None,
            meta: BTreeMap::new(),
            add_to_history: true,
            origin: Origin::Local,
            history_action: None,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn doc_changed(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn adds_to_history(&self) -> bool {
        self.add_to_history
    }

    pub fn history_action(&self) -> Option<HistoryAction> {
        self.history_action
    }

    /// Inverse steps in the order that undoes this transaction.
    pub fn inverted_steps(&self) -> Vec<Step> {
        self.inverted.iter().rev().cloned().collect()
    }

    pub(crate) fn selection_override(&self) -> Option<&Selection> {
        self.selection_set.then_some(&self.selection)
    }

    pub(crate) fn stored_marks_override(&self) -> Option<&Option<Vec<Mark>>> {
        self.stored_marks.as_ref()
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn set_add_to_history(&mut self, add: bool) -> &mut Self {
        self.add_to_history = add;
        self
    }

    pub fn set_origin(&mut self, origin: Origin) -> &mut Self {
        self.origin = origin;
        if origin == Origin::Remote {
            self.add_to_history = false;
        }
        self
    }

    pub(crate) fn set_history_action(&mut self, action: HistoryAction) -> &mut Self {
        self.origin = Origin::History;
        self.history_action = Some(action);
        self.meta
            .insert("history".to_string(), Value::from(action.as_str()));
        self
    }

    pub fn set_selection(&mut self, selection: Selection) -> &mut Self {
        self.selection = selection;
        self.selection_set = true;
        self
    }

    pub fn set_stored_marks(&mut self, marks: Option<Vec<Mark>>) -> &mut Self {
        self.stored_marks = Some(marks);
        self
    }

    /// Apply a step, mapping the tracked selection through it.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, EditorError> {
        let (doc, inverse) = step.apply(&self.schema, &self.doc)?;
        self.selection = Selection::new(
            step.map_position(&self.selection.anchor),
            step.map_position(&self.selection.head),
        );
        self.doc = doc;
        self.steps.push(step);
        self.inverted.push(inverse);
        Ok(self)
    }

    pub fn replace(
        &mut self,
        path: Vec<usize>,
        from: usize,
        to: usize,
        content: Vec<Node>,
    ) -> Result<&mut Self, EditorError> {
        self.step(Step::Replace {
            path,
            from,
            to,
            content,
        })
    }

    /// Replace the node at `path` with `nodes`.
    pub fn replace_node(&mut self, path: &[usize], nodes: Vec<Node>) -> Result<&mut Self, EditorError> {
        let (&index, parent) = path
            .split_last()
            .ok_or_else(|| EditorError::InvalidPath(path.to_vec()))?;
        self.replace(parent.to_vec(), index, index + 1, nodes)
    }

    pub fn set_node_attrs(&mut self, path: &[usize], attrs: Attrs) -> Result<&mut Self, EditorError> {
        self.step(Step::SetAttrs {
            path: path.to_vec(),
            attrs,
        })
    }

    /// Insert text with `marks` at the selection, replacing selected content.
    pub fn insert_text(&mut self, text: &str, marks: &[Mark]) -> Result<&mut Self, EditorError> {
        if !self.selection.is_empty() {
            self.delete_selection()?;
        }
        if text.is_empty() {
            return Ok(self);
        }
        let cursor = self.selection.head.clone();
        let node = self.schema.text(text, marks)?;
        self.replace(cursor.path, cursor.offset, cursor.offset, vec![node])?;
        Ok(self)
    }

    /// Insert an inline node at the cursor.
    pub fn insert_inline(&mut self, node: Node) -> Result<&mut Self, EditorError> {
        if !self.selection.is_empty() {
            self.delete_selection()?;
        }
        let cursor = self.selection.head.clone();
        self.replace(cursor.path, cursor.offset, cursor.offset, vec![node])
    }

    pub fn delete_selection(&mut self) -> Result<&mut Self, EditorError> {
        let from = self.selection.from().clone();
        let to = self.selection.to().clone();
        self.delete_range(&from, &to)?;
        self.set_selection(Selection::cursor(from));
        Ok(self)
    }

    /// Delete between two textblock positions. When both blocks are
    /// siblings the second is joined into the first.
    pub fn delete_range(&mut self, from: &Position, to: &Position) -> Result<&mut Self, EditorError> {
        if from.path == to.path {
            if from.offset < to.offset {
                self.replace(from.path.clone(), from.offset, to.offset, Vec::new())?;
            }
            return Ok(self);
        }
        let depth = from
            .path
            .iter()
            .zip(&to.path)
            .take_while(|(a, b)| a == b)
            .count();
        if depth >= from.path.len() || depth >= to.path.len() {
            return Err(EditorError::InvalidPath(to.path.clone()));
        }
        let ancestor = from.path[..depth].to_vec();
        let (a, b) = (from.path[depth], to.path[depth]);

        let end_size = self.block_size(&to.path)?;
        let tail = self
            .doc
            .node_at(&to.path)
            .map(|n| inline::slice(n.content(), to.offset, end_size))
            .unwrap_or_default();
        self.replace(to.path.clone(), 0, to.offset, Vec::new())?;
        let start_size = self.block_size(&from.path)?;
        self.replace(from.path.clone(), from.offset, start_size, Vec::new())?;
        if b > a + 1 {
            self.replace(ancestor.clone(), a + 1, b, Vec::new())?;
        }

        let siblings = from.path.len() == depth + 1 && to.path.len() == depth + 1;
        if siblings {
            self.replace(from.path.clone(), from.offset, from.offset, tail)?;
            self.replace(ancestor, a + 1, a + 2, Vec::new())?;
        }
        Ok(self)
    }

    fn block_size(&self, path: &[usize]) -> Result<usize, EditorError> {
        self.doc
            .node_at(path)
            .map(|n| inline::content_size(n.content()))
            .ok_or_else(|| EditorError::InvalidPath(path.to_vec()))
    }

    /// Split the textblock at the cursor. The new block has `new_type`, or
    /// the type of the split block when `None`.
    pub fn split_block(&mut self, new_type: Option<&str>) -> Result<&mut Self, EditorError> {
        if !self.selection.is_empty() {
            self.delete_selection()?;
        }
        let cursor = self.selection.head.clone();
        let block = self
            .doc
            .node_at(&cursor.path)
            .ok_or_else(|| EditorError::InvalidPath(cursor.path.clone()))?
            .clone();
        let (before, after) = inline::split_at(block.content(), cursor.offset);
        let first = self.schema.replace_content(&block, before)?;
        let second = match new_type {
            Some(name) => self.schema.create_and_fill(name, Attrs::new(), after)?,
            None => self.schema.replace_content(&block, after)?,
        };
        self.replace_node(&cursor.path, vec![first, second])?;
        let mut next = cursor.path.clone();
        if let Some(last) = next.last_mut() {
            *last += 1;
        }
        self.set_selection(Selection::cursor(Position::new(next, 0)));
        Ok(self)
    }

    /// Change the type of the textblock at `path`, keeping its content.
    pub fn set_block_type(&mut self, path: &[usize], node_type: &str, attrs: Attrs) -> Result<&mut Self, EditorError> {
        let block = self
            .doc
            .node_at(path)
            .ok_or_else(|| EditorError::InvalidPath(path.to_vec()))?;
        let offset = self.selection.head.offset;
        let target = self
            .schema
            .node_type(node_type)
            .ok_or_else(|| crate::error::SchemaError::UnknownNodeType(node_type.to_string()))?;
        let content = if target.is_code() {
            // Code holds plain text only.
            let text: String = block.content().iter().filter_map(Node::text).collect();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![self.schema.text(text, &[])?]
            }
        } else {
            let content = block
                .content()
                .iter()
                .map(|child| {
                    let marks: Vec<Mark> = child
                        .marks()
                        .iter()
                        .filter(|m| target.allows_mark(m.mark_type()))
                        .cloned()
                        .collect();
                    child.with_marks(marks)
                })
                .collect();
            inline::normalize(content)
        };
        let node = self.schema.node(node_type, attrs, content)?;
        let keep_cursor = self.selection.head.path == path;
        self.replace_node(path, vec![node])?;
        if keep_cursor {
            self.set_selection(Selection::cursor(Position::new(path.to_vec(), offset)));
        }
        Ok(self)
    }

    /// Wrap the block at `path` in `wrapper`, through an intermediate
    /// `item` node when given (list wrappers).
    pub fn wrap_block(
        &mut self,
        path: &[usize],
        wrapper: &str,
        attrs: Attrs,
        item: Option<&str>,
    ) -> Result<&mut Self, EditorError> {
        let block = self
            .doc
            .node_at(path)
            .ok_or_else(|| EditorError::InvalidPath(path.to_vec()))?
            .clone();
        let (inner, extra) = match item {
            Some(item) => (self.schema.node(item, Attrs::new(), vec![block])?, 2),
            None => (block, 1),
        };
        let wrapped = self.schema.node(wrapper, attrs, vec![inner])?;
        let keep = self.selection.head.path.starts_with(path);
        let offset = self.selection.head.offset;
        self.replace_node(path, vec![wrapped])?;
        if keep {
            let mut inner_path = path.to_vec();
            inner_path.extend(std::iter::repeat_n(0, extra));
            self.set_selection(Selection::cursor(Position::new(inner_path, offset)));
        }
        Ok(self)
    }

    /// Apply `f` to the mark sets in the selection's block range.
    fn map_selection_marks<F>(&mut self, f: F) -> Result<&mut Self, EditorError>
    where
        F: Fn(&Schema, &[Mark]) -> Vec<Mark>,
    {
        let from = self.selection.from().clone();
        let to = self.selection.to().clone();
        let blocks = super::state::textblocks(&self.doc, &self.schema);
        for path in blocks.into_iter().filter(|p| *p >= from.path && *p <= to.path) {
            let size = self.block_size(&path)?;
            let start = if path == from.path { from.offset } else { 0 };
            let end = if path == to.path { to.offset } else { size };
            if start >= end {
                continue;
            }
            let Some(block) = self.doc.node_at(&path) else {
                continue;
            };
            let schema = self.schema.clone();
            let allowed = schema.node_type(block.node_type()).cloned();
            let mapped = inline::map_marks(block.content(), start, end, |marks| {
                f(&schema, marks)
                    .into_iter()
                    .filter(|m| allowed.as_ref().is_some_and(|t| t.allows_mark(m.mark_type())))
                    .collect()
            });
            let slice = inline::slice(&mapped, start, end);
            self.replace(path, start, end, slice)?;
        }
        Ok(self)
    }

    pub fn add_mark(&mut self, mark: Mark) -> Result<&mut Self, EditorError> {
        self.map_selection_marks(|schema, marks| schema.add_mark(marks, mark.clone()))
    }

    pub fn remove_mark(&mut self, mark_type: &str) -> Result<&mut Self, EditorError> {
        self.map_selection_marks(|schema, marks| schema.remove_mark(marks, mark_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeSpec, SchemaBuilder};

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::new()
                .node("doc", NodeSpec::new().content("block+"))
                .node("paragraph", NodeSpec::new().content("inline*").group("block"))
                .node("text", NodeSpec::new().inline().group("inline"))
                .build()
                .unwrap(),
        )
    }

    fn doc(schema: &Schema, paragraphs: &[&str]) -> Node {
        let content = paragraphs
            .iter()
            .map(|t| {
                let text = if t.is_empty() {
                    vec![]
                } else {
                    vec![schema.text(*t, &[]).unwrap()]
                };
                schema.node("paragraph", Attrs::new(), text).unwrap()
            })
            .collect();
        schema.node("doc", Attrs::new(), content).unwrap()
    }

    fn tr(schema: &Arc<Schema>, doc: Node, selection: Selection) -> Transaction {
        Transaction::new(schema.clone(), doc, 0, selection)
    }

    #[test]
    fn replace_is_inverted_exactly() {
        let schema = schema();
        let before = doc(&schema, &["hello"]);
        let step = Step::Replace {
            path: vec![0],
            from: 1,
            to: 4,
            content: vec![schema.text("ipp", &[]).unwrap()],
        };
        let (after, inverse) = step.apply(&schema, &before).unwrap();
        assert_eq!(after.text_content(), "hippo");
        let (restored, _) = inverse.apply(&schema, &after).unwrap();
        assert_eq!(restored, before);
    }

    #[test]
    fn invalid_content_is_rejected() {
        let schema = schema();
        let before = doc(&schema, &["a"]);
        let step = Step::Replace {
            path: vec![],
            from: 0,
            to: 1,
            content: vec![],
        };
        assert!(matches!(
            step.apply(&schema, &before),
            Err(EditorError::Schema(_))
        ));
    }

    #[test]
    fn positions_map_through_block_changes() {
        let step = Step::Replace {
            path: vec![],
            from: 1,
            to: 2,
            content: vec![],
        };
        assert_eq!(
            step.map_position(&Position::new(vec![3], 2)),
            Position::new(vec![2], 2)
        );
        assert_eq!(
            step.map_position(&Position::new(vec![0], 2)),
            Position::new(vec![0], 2)
        );
    }

    #[test]
    fn typing_moves_the_cursor() {
        let schema = schema();
        let cursor = Selection::cursor(Position::new(vec![0], 2));
        let mut tr = tr(&schema, doc(&schema, &["ab"]), cursor);
        tr.insert_text("cd", &[]).unwrap();
        assert_eq!(tr.doc().text_content(), "abcd");
        assert_eq!(tr.selection().head, Position::new(vec![0], 4));
    }

    #[test]
    fn deleting_across_blocks_joins_them() {
        let schema = schema();
        let selection = Selection::new(Position::new(vec![0], 2), Position::new(vec![2], 1));
        let mut tr = tr(&schema, doc(&schema, &["one", "two", "three"]), selection);
        tr.delete_selection().unwrap();
        assert_eq!(tr.doc().child_count(), 1);
        assert_eq!(tr.doc().text_content(), "onhree");
        assert_eq!(tr.selection().head, Position::new(vec![0], 2));
    }

    #[test]
    fn split_block_moves_cursor_to_new_block() {
        let schema = schema();
        let cursor = Selection::cursor(Position::new(vec![0], 3));
        let mut tr = tr(&schema, doc(&schema, &["abcdef"]), cursor);
        tr.split_block(None).unwrap();
        assert_eq!(tr.doc().child_count(), 2);
        assert_eq!(tr.doc().child(1).unwrap().text_content(), "def");
        assert_eq!(tr.selection().head, Position::new(vec![1], 0));
    }
}
