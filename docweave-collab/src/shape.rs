//! Shared storage form of a top-level block.
//!
//! A block is kept as a shape plus one text per textblock inside it. The
//! shape is the block's JSON where every textblock's inline content is
//! replaced by the text it was written with and its formatting runs. The
//! texts live in Loro text containers, so concurrent typing merges per
//! character while formatting and attributes resolve per block.

use crate::binding::changed_range;
use docweave_core::model::LEAF_PLACEHOLDER;
use docweave_core::Schema;
use serde_json::{json, Map, Value};

const TEXT: &str = "text";
const RUNS: &str = "runs";
const CONTENT: &str = "content";

static NO_MARKS: Value = Value::Null;

/// Split block JSON into its shape, pushing the text of each textblock in
/// document order.
pub(crate) fn split(schema: &Schema, block: &Value, texts: &mut Vec<String>) -> Value {
    let Some(obj) = block.as_object() else {
        return block.clone();
    };
    let mut shape = obj.clone();
    let children = match shape.remove(CONTENT) {
        Some(Value::Array(children)) => children,
        _ => Vec::new(),
    };
    let node_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();

    if schema.is_textblock(node_type) {
        let mut text = String::new();
        let mut runs = Vec::with_capacity(children.len());
        for child in children {
            match child.get(TEXT).and_then(Value::as_str) {
                Some(run) if child.get("type").and_then(Value::as_str) == Some("text") => {
                    text.push_str(run);
                    let marks = child.get("marks").cloned().unwrap_or(Value::Null);
                    runs.push(json!({ "len": run.chars().count(), "marks": marks }));
                }
                _ => {
                    text.push(LEAF_PLACEHOLDER);
                    runs.push(json!({ "leaf": child }));
                }
            }
        }
        shape.insert(TEXT.to_string(), Value::String(text.clone()));
        shape.insert(RUNS.to_string(), Value::Array(runs));
        texts.push(text);
    } else if !children.is_empty() {
        let children = children.iter().map(|c| split(schema, c, texts)).collect();
        shape.insert(CONTENT.to_string(), Value::Array(children));
    }
    Value::Object(shape)
}

/// Rebuild block JSON from `shape`. `text_at(k)` yields the current text of
/// the k-th textblock; when it has none the text recorded in the shape is
/// used.
pub(crate) fn join<F>(shape: &Value, text_at: &mut F) -> Value
where
    F: FnMut(usize) -> Option<String>,
{
    join_from(shape, text_at, &mut 0)
}

fn join_from<F>(shape: &Value, text_at: &mut F, next: &mut usize) -> Value
where
    F: FnMut(usize) -> Option<String>,
{
    let Some(obj) = shape.as_object() else {
        return shape.clone();
    };
    let mut block: Map<String, Value> = obj.clone();

    if let (Some(Value::String(written)), Some(Value::Array(runs))) = (obj.get(TEXT), obj.get(RUNS)) {
        let index = *next;
        *next += 1;
        let current = text_at(index).unwrap_or_else(|| written.clone());
        block.remove(TEXT);
        block.remove(RUNS);
        let content = relayout(written, runs, &current);
        if !content.is_empty() {
            block.insert(CONTENT.to_string(), Value::Array(content));
        }
        return Value::Object(block);
    }

    if let Some(Value::Array(children)) = obj.get(CONTENT) {
        let children = children
            .iter()
            .map(|c| join_from(c, text_at, next))
            .collect();
        block.insert(CONTENT.to_string(), Value::Array(children));
    }
    Value::Object(block)
}

#[derive(Clone, Copy)]
enum Slot<'a> {
    Text(&'a Value),
    Leaf(&'a Value),
}

/// Lay the formatting runs recorded against `written` over `current`.
/// Characters both share keep their marks, inserted characters take the
/// marks of the text before them, and placeholders without a recorded leaf
/// are dropped.
fn relayout(written: &str, runs: &[Value], current: &str) -> Vec<Value> {
    let mut slots: Vec<Slot<'_>> = Vec::new();
    for run in runs {
        match run.get("leaf") {
            Some(leaf) => slots.push(Slot::Leaf(leaf)),
            None => {
                let len = run.get("len").and_then(Value::as_u64).unwrap_or(0) as usize;
                let marks = run.get("marks").unwrap_or(&NO_MARKS);
                slots.extend(std::iter::repeat(Slot::Text(marks)).take(len));
            }
        }
    }
    let written: Vec<char> = written.chars().collect();
    if slots.len() != written.len() {
        slots = vec![Slot::Text(&NO_MARKS); written.len()];
    }
    let current: Vec<char> = current.chars().collect();
    let range = changed_range(&written, &current);
    let slot_at = |i: usize| {
        match &range {
            None => slots.get(i).copied(),
            Some(r) if i < r.start => slots.get(i).copied(),
            Some(r) if i >= r.new_end => slots.get(i - r.new_end + r.old_end).copied(),
            Some(_) => None,
        }
    };

    let mut content = Vec::new();
    let mut run = String::new();
    let mut run_marks: &Value = &NO_MARKS;
    let mut last_marks: &Value = &NO_MARKS;
    for (i, &ch) in current.iter().enumerate() {
        let marks = match slot_at(i) {
            Some(Slot::Leaf(leaf)) if ch == LEAF_PLACEHOLDER => {
                flush_run(&mut content, &mut run, run_marks);
                content.push(leaf.clone());
                continue;
            }
            None if ch == LEAF_PLACEHOLDER => continue,
            Some(Slot::Text(marks)) => marks,
            _ => last_marks,
        };
        if marks != run_marks {
            flush_run(&mut content, &mut run, run_marks);
        }
        run.push(ch);
        run_marks = marks;
        last_marks = marks;
    }
    flush_run(&mut content, &mut run, run_marks);
    content
}

fn flush_run(content: &mut Vec<Value>, run: &mut String, marks: &Value) {
    if run.is_empty() {
        return;
    }
    let mut node = Map::new();
    node.insert("type".to_string(), Value::from("text"));
    node.insert(TEXT.to_string(), Value::String(std::mem::take(run)));
    if marks.as_array().is_some_and(|m| !m.is_empty()) {
        node.insert("marks".to_string(), marks.clone());
    }
    content.push(Value::Object(node));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong() -> Value {
        json!([{ "type": "strong" }])
    }

    fn runs() -> Vec<Value> {
        vec![
            json!({ "len": 2, "marks": strong() }),
            json!({ "len": 2, "marks": null }),
        ]
    }

    #[test]
    fn unchanged_text_keeps_its_runs() {
        let content = relayout("Body", &runs(), "Body");
        assert_eq!(
            content,
            vec![
                json!({ "type": "text", "text": "Bo", "marks": strong() }),
                json!({ "type": "text", "text": "dy" }),
            ]
        );
    }

    #[test]
    fn inserted_text_takes_the_marks_before_it() {
        let content = relayout("Body", &runs(), "xBoXdyy");
        assert_eq!(
            content,
            vec![
                json!({ "type": "text", "text": "x" }),
                json!({ "type": "text", "text": "BoX", "marks": strong() }),
                json!({ "type": "text", "text": "dyy" }),
            ]
        );
    }

    #[test]
    fn leaves_follow_their_placeholders() {
        let leaf = json!({ "type": "hard_break" });
        let runs = vec![
            json!({ "len": 1, "marks": null }),
            json!({ "leaf": leaf.clone() }),
            json!({ "len": 1, "marks": null }),
        ];
        let written = format!("a{LEAF_PLACEHOLDER}b");
        let current = format!("za{LEAF_PLACEHOLDER}b{LEAF_PLACEHOLDER}");
        let content = relayout(&written, &runs, &current);
        assert_eq!(
            content,
            vec![
                json!({ "type": "text", "text": "za" }),
                leaf,
                json!({ "type": "text", "text": "b" }),
            ]
        );
    }
}
