//! Document tree: nodes, marks and attribute bags.
//!
//! Nodes are immutable values. They are only created through a
//! [`Schema`](crate::schema::Schema), which validates attributes, content and
//! mark placement, so any `Node` handed out by the engine is well formed.

pub(crate) mod content;
pub(crate) mod inline;

pub use content::{ContentExpr, ContentTerm};

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute bag attached to nodes and marks.
pub type Attrs = BTreeMap<String, Value>;

/// Object replacement character used to stand in for inline leaf nodes when
/// a textblock is flattened to a string.
pub const LEAF_PLACEHOLDER: char = '\u{fffc}';

/// An inline decoration attached to a text run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mark {
    #[serde(rename = "type")]
    mark_type: String,
    #[serde(skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,
}

impl Mark {
    pub(crate) fn new(mark_type: impl Into<String>, attrs: Attrs) -> Self {
        Self {
            mark_type: mark_type.into(),
            attrs,
        }
    }

    pub fn mark_type(&self) -> &str {
        &self.mark_type
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.contains(self)
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    content: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    marks: Vec<Mark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Node {
    pub(crate) fn element(node_type: impl Into<String>, attrs: Attrs, content: Vec<Node>) -> Self {
        Self {
            node_type: node_type.into(),
            attrs,
            content,
            marks: Vec::new(),
            text: None,
        }
    }

    pub(crate) fn text_node(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            node_type: "text".to_string(),
            attrs: Attrs::new(),
            content: Vec::new(),
            marks,
            text: Some(text.into()),
        }
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        self.attr(key).and_then(Value::as_u64)
    }

    pub fn attr_bool(&self, key: &str) -> bool {
        self.attr(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn content(&self) -> &[Node] {
        &self.content
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.content.get(index)
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.content.last()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn has_mark(&self, mark_type: &str) -> bool {
        self.marks.iter().any(|m| m.mark_type == mark_type)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_text(&self) -> bool {
        self.text.is_some()
    }

    /// Concatenated text of this node and all descendants.
    pub fn text_content(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => {
                let mut out = String::new();
                for child in &self.content {
                    out.push_str(&child.text_content());
                }
                out
            }
        }
    }

    /// Size of this node when counted as inline content: characters for
    /// text, one for any other inline node.
    pub fn inline_size(&self) -> usize {
        match &self.text {
            Some(text) => text.chars().count(),
            None => 1,
        }
    }

    /// Follow a path of child indices from this node.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let mut node = self;
        for &index in path {
            node = node.content.get(index)?;
        }
        Some(node)
    }

    /// Visit this node and every descendant in document order, passing the
    /// path of each visited node relative to `self`.
    pub fn descendants<F>(&self, f: &mut F)
    where
        F: FnMut(&Node, &[usize]),
    {
        let mut path = Vec::new();
        self.walk(&mut path, f);
    }

    fn walk<F>(&self, path: &mut Vec<usize>, f: &mut F)
    where
        F: FnMut(&Node, &[usize]),
    {
        f(self, path);
        for (i, child) in self.content.iter().enumerate() {
            path.push(i);
            child.walk(path, f);
            path.pop();
        }
    }

    /// Same mark set and type, used when merging adjacent text runs.
    pub(crate) fn same_markup(&self, other: &Node) -> bool {
        self.node_type == other.node_type && self.attrs == other.attrs && self.marks == other.marks
    }

    pub(crate) fn with_content(&self, content: Vec<Node>) -> Node {
        Node {
            node_type: self.node_type.clone(),
            attrs: self.attrs.clone(),
            content,
            marks: self.marks.clone(),
            text: self.text.clone(),
        }
    }

    pub(crate) fn with_text(&self, text: String) -> Node {
        Node {
            text: Some(text),
            ..self.clone()
        }
    }

    pub(crate) fn with_marks(&self, marks: Vec<Mark>) -> Node {
        Node {
            marks,
            ..self.clone()
        }
    }

    pub(crate) fn with_attrs(&self, attrs: Attrs) -> Node {
        Node {
            attrs,
            ..self.clone()
        }
    }

    pub(crate) fn into_content(self) -> Vec<Node> {
        self.content
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn para(text: &str) -> Node {
        Node::element(
            "paragraph",
            Attrs::new(),
            vec![Node::text_node(text, Vec::new())],
        )
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let doc = Node::element("doc", Attrs::new(), vec![para("one "), para("two")]);
        assert_eq!(doc.text_content(), "one two");
        assert_eq!(doc.node_at(&[1, 0]).and_then(Node::text), Some("two"));
        assert!(doc.node_at(&[2]).is_none());
    }

    #[test]
    fn descendants_reports_paths() {
        let doc = Node::element("doc", Attrs::new(), vec![para("a"), para("b")]);
        let mut seen = Vec::new();
        doc.descendants(&mut |node, path| seen.push((node.node_type().to_string(), path.to_vec())));
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[3], ("paragraph".to_string(), vec![1]));
    }

    #[test]
    fn json_omits_empty_fields() {
        let node = Node::text_node("hi", vec![Mark::new("em", Attrs::new())]);
        assert_eq!(
            node.to_json(),
            json!({"type": "text", "text": "hi", "marks": [{"type": "em"}]})
        );
    }
}
