//! Offset arithmetic over the inline content of a textblock.
//!
//! Offsets count characters of text nodes and one unit per inline leaf.

use super::{Mark, Node, LEAF_PLACEHOLDER};

pub(crate) fn content_size(content: &[Node]) -> usize {
    content.iter().map(Node::inline_size).sum()
}

fn split_text(text: &str, at: usize) -> (String, String) {
    let byte = text
        .char_indices()
        .nth(at)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (text[..byte].to_string(), text[byte..].to_string())
}

/// Split inline content at `offset`.
pub(crate) fn split_at(content: &[Node], offset: usize) -> (Vec<Node>, Vec<Node>) {
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut pos = 0;
    for node in content {
        let size = node.inline_size();
        if pos + size <= offset {
            before.push(node.clone());
        } else if pos >= offset {
            after.push(node.clone());
        } else if let Some(text) = node.text() {
            let (left, right) = split_text(text, offset - pos);
            before.push(node.with_text(left));
            after.push(node.with_text(right));
        } else {
            after.push(node.clone());
        }
        pos += size;
    }
    (before, after)
}

pub(crate) fn slice(content: &[Node], from: usize, to: usize) -> Vec<Node> {
    let (head, _) = split_at(content, to);
    split_at(&head, from).1
}

/// Drop empty text nodes and merge neighbouring text runs with equal marks.
pub(crate) fn normalize(content: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(content.len());
    for node in content {
        if node.text().is_some_and(str::is_empty) {
            continue;
        }
        if let (Some(prev), Some(text)) = (out.last_mut(), node.text()) {
            if let Some(prev_text) = prev.text() {
                if prev.same_markup(&node) {
                    *prev = prev.with_text(format!("{prev_text}{text}"));
                    continue;
                }
            }
        }
        out.push(node);
    }
    out
}

pub(crate) fn replace_range(content: &[Node], from: usize, to: usize, insert: Vec<Node>) -> Vec<Node> {
    let (before, _) = split_at(content, from);
    let (_, after) = split_at(content, to);
    let mut out = before;
    out.extend(insert);
    out.extend(after);
    normalize(out)
}

/// Flatten inline content to a string, inline leaves becoming
/// [`LEAF_PLACEHOLDER`].
pub(crate) fn flatten(content: &[Node]) -> String {
    let mut out = String::new();
    for node in content {
        match node.text() {
            Some(text) => out.push_str(text),
            None => out.push(LEAF_PLACEHOLDER),
        }
    }
    out
}

/// Marks in effect at `offset`: those of the unit before it, or of the first
/// unit at the start of the block.
pub(crate) fn marks_at(content: &[Node], offset: usize) -> Vec<Mark> {
    let mut pos = 0;
    for node in content {
        let size = node.inline_size();
        if offset > pos && offset <= pos + size {
            return node.marks().to_vec();
        }
        if offset == 0 {
            return node.marks().to_vec();
        }
        pos += size;
    }
    Vec::new()
}

/// Rewrite the mark sets of everything in `from..to`.
pub(crate) fn map_marks<F>(content: &[Node], from: usize, to: usize, f: F) -> Vec<Node>
where
    F: Fn(&[Mark]) -> Vec<Mark>,
{
    let (before, rest) = split_at(content, from);
    let (middle, after) = split_at(&rest, to - from);
    let mut out = before;
    out.extend(middle.iter().map(|node| node.with_marks(f(node.marks()))));
    out.extend(after);
    normalize(out)
}

/// True when every text unit in `from..to` carries a mark of `mark_type`.
pub(crate) fn range_has_mark(content: &[Node], from: usize, to: usize, mark_type: &str) -> bool {
    let texts: Vec<Node> = slice(content, from, to)
        .into_iter()
        .filter(Node::is_text)
        .collect();
    !texts.is_empty() && texts.iter().all(|n| n.has_mark(mark_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attrs;

    fn text(s: &str) -> Node {
        Node::text_node(s, Vec::new())
    }

    fn em(s: &str) -> Node {
        Node::text_node(s, vec![Mark::new("em", Attrs::new())])
    }

    #[test]
    fn split_counts_chars_and_leaves() {
        let content = vec![text("héllo"), Node::element("image", Attrs::new(), vec![]), text("x")];
        assert_eq!(content_size(&content), 7);
        let (a, b) = split_at(&content, 2);
        assert_eq!(flatten(&a), "hé");
        assert_eq!(flatten(&b), "llo\u{fffc}x");
        assert_eq!(flatten(&slice(&content, 4, 6)), "o\u{fffc}");
    }

    #[test]
    fn normalize_merges_equal_runs() {
        let merged = normalize(vec![text("a"), text(""), text("b"), em("c"), em("d")]);
        assert_eq!(merged, vec![text("ab"), em("cd")]);
    }

    #[test]
    fn map_marks_limits_to_range() {
        let content = vec![text("hello world")];
        let marked = map_marks(&content, 6, 11, |_| vec![Mark::new("em", Attrs::new())]);
        assert_eq!(marked, vec![text("hello "), em("world")]);
        assert!(range_has_mark(&marked, 6, 11, "em"));
        assert!(!range_has_mark(&marked, 0, 11, "em"));
        assert_eq!(marks_at(&marked, 8).len(), 1);
        assert!(marks_at(&marked, 3).is_empty());
    }
}
