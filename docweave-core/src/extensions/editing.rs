//! Behaviour-only descriptors: core editing commands, undo history, a
//! trailing paragraph and typographic replacements.

use super::commands::{ancestor_of_type, attr_string, lift_item, split_item, LIST_ITEMS};
use crate::editor::input_rules::text_rule;
use crate::editor::{
    chain, command_fn, emit, history, Command, CommandFn, EditorState, InputRule, KeyBinding, Origin, Plugin,
    Position, Selection, Transaction,
};
use crate::extension::Extension;
use crate::model::{inline, Attrs};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use tracing::trace;

fn split_block() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let Some(block) = state.head_block() else {
            return false;
        };
        let selection = state.selection();
        let size = inline::content_size(block.content());
        // Enter at the end of a heading continues with a paragraph.
        let new_type = (block.node_type() != "paragraph"
            && selection.is_empty()
            && selection.head.offset == size
            && !state.schema().is_code(block.node_type()))
        .then_some("paragraph");
        let mut tr = state.tr();
        if tr.split_block(new_type).is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

fn insert_text() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let Some(text) = attr_string(attrs, "text").filter(|t| !t.is_empty()) else {
            return false;
        };
        let mut tr = state.tr();
        if tr.insert_text(&text, &state.marks_at_cursor()).is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

fn delete_selection() -> CommandFn {
    command_fn(|state, _, dispatch| {
        if state.selection().is_empty() {
            return false;
        }
        let mut tr = state.tr();
        if tr.delete_selection().is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

fn select_all() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let mut tr = state.tr();
        tr.set_selection(Selection::all(state.doc(), state.schema()));
        emit(dispatch, tr)
    })
}

fn newline_in_code() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let in_code_block = state
            .head_block()
            .is_some_and(|b| state.schema().is_code(b.node_type()));
        if !in_code_block {
            return false;
        }
        let mut tr = state.tr();
        if tr.insert_text("\n", &[]).is_err() {
            return false;
        }
        emit(dispatch, tr)
    })
}

fn split_list_item() -> CommandFn {
    command_fn(|state, _, dispatch| split_item(state, dispatch))
}

/// Backspace at a block start. Lifts list items, resets block types, then
/// joins with the previous textblock or removes a previous leaf block.
fn join_backward(state: &EditorState, dispatch: Option<&mut dyn FnMut(Transaction)>) -> bool {
    let doc = state.doc();
    let schema = state.schema();
    let head = state.selection().head.clone();
    let Some(block) = doc.node_at(&head.path) else {
        return false;
    };

    let first_in_item = ancestor_of_type(doc, &head.path, &LIST_ITEMS)
        .is_some_and(|item| head.path.len() == item.len() + 1 && head.path.last() == Some(&0));
    if first_in_item {
        return lift_item(state, dispatch);
    }

    let mut tr = state.tr();
    if block.node_type() != "paragraph" {
        if tr.set_block_type(&head.path, "paragraph", Attrs::new()).is_err() {
            return false;
        }
        return emit(dispatch, tr);
    }

    let Some((&index, parent)) = head.path.split_last() else {
        return false;
    };
    if index == 0 {
        return false;
    }
    let mut previous_path = parent.to_vec();
    previous_path.push(index - 1);
    let Some(previous) = doc.node_at(&previous_path) else {
        return false;
    };

    if schema.is_textblock(previous.node_type()) && !schema.is_inline(previous.node_type()) {
        let size = inline::content_size(previous.content());
        let end = Position::new(previous_path.clone(), size);
        if tr.delete_range(&end, &Position::new(head.path.clone(), 0)).is_err() {
            return false;
        }
        tr.set_selection(Selection::cursor(end));
        return emit(dispatch, tr);
    }
    if previous.child_count() == 0 {
        if tr.replace(parent.to_vec(), index - 1, index, Vec::new()).is_err() {
            return false;
        }
        tr.set_selection(Selection::cursor(Position::new(previous_path, 0)));
        return emit(dispatch, tr);
    }
    false
}

fn delete_backward() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let selection = state.selection();
        let mut tr = state.tr();
        if !selection.is_empty() {
            if tr.delete_selection().is_err() {
                return false;
            }
            return emit(dispatch, tr);
        }
        let head = selection.head.clone();
        if head.offset > 0 {
            if tr
                .replace(head.path.clone(), head.offset - 1, head.offset, Vec::new())
                .is_err()
            {
                return false;
            }
            return emit(dispatch, tr);
        }
        join_backward(state, dispatch)
    })
}

pub struct BasicEditing;

impl Extension for BasicEditing {
    fn name(&self) -> &str {
        "basic_editing"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("split_block", split_block()),
            Command::new("insert_text", insert_text()),
            Command::new("delete_selection", delete_selection()),
            Command::new("delete_backward", delete_backward()),
            Command::new("select_all", select_all()).read_only(),
            Command::new("newline_in_code", newline_in_code()),
            Command::new("split_list_item", split_list_item()),
        ]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![
            KeyBinding::new("Enter", chain(vec![newline_in_code(), split_list_item(), split_block()])),
            KeyBinding::new("Backspace", delete_backward()),
            KeyBinding::new("Mod-a", select_all()).read_only(),
        ]
    }
}

fn undo() -> CommandFn {
    command_fn(|state, _, dispatch| match history::undo(state) {
        Some(tr) => emit(dispatch, tr),
        None => false,
    })
}

fn redo() -> CommandFn {
    command_fn(|state, _, dispatch| match history::redo(state) {
        Some(tr) => emit(dispatch, tr),
        None => false,
    })
}

/// Undo and redo of local changes.
pub struct History;

impl Extension for History {
    fn name(&self) -> &str {
        "history"
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("undo", undo()), Command::new("redo", redo())]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![
            KeyBinding::new("Mod-z", undo()),
            KeyBinding::new("Shift-Mod-z", redo()),
            KeyBinding::new("Mod-y", redo()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingNodeOptions {
    /// Node type kept at the end of the document.
    pub node: String,
}

impl Default for TrailingNodeOptions {
    fn default() -> Self {
        Self {
            node: "paragraph".to_string(),
        }
    }
}

/// Keeps a node of the configured type at the end of the document, so
/// there is always somewhere to type after a table or rule.
pub struct TrailingNode {
    options: TrailingNodeOptions,
}

impl TrailingNode {
    pub fn new(options: TrailingNodeOptions) -> Self {
        Self { options }
    }
}

impl Extension for TrailingNode {
    fn name(&self) -> &str {
        "trailing_node"
    }

    fn plugins(&self) -> Vec<Box<dyn Plugin>> {
        vec![Box::new(TrailingNodePlugin {
            node: self.options.node.clone(),
        })]
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }
}

struct TrailingNodePlugin {
    node: String,
}

impl Plugin for TrailingNodePlugin {
    fn key(&self) -> &str {
        "trailing_node"
    }

    fn apply(&mut self, tr: &Transaction, _old: &EditorState, new: &EditorState) -> Option<Transaction> {
        if !tr.doc_changed() || tr.origin() == Origin::Remote {
            return None;
        }
        let doc = new.doc();
        if doc.last_child().is_some_and(|last| last.node_type() == self.node) {
            return None;
        }
        let node = new.schema().create_and_fill(&self.node, Attrs::new(), Vec::new()).ok()?;
        let end = doc.child_count();
        let mut follow_up = new.tr();
        follow_up.replace(Vec::new(), end, end, vec![node]).ok()?;
        follow_up.set_add_to_history(false);
        trace!(node = %self.node, "Appending trailing node");
        Some(follow_up)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartTextOptions {
    pub quotes: bool,
    pub dashes: bool,
    pub arrows: bool,
    pub symbols: bool,
}

impl Default for SmartTextOptions {
    fn default() -> Self {
        Self {
            quotes: true,
            dashes: true,
            arrows: true,
            symbols: true,
        }
    }
}

fn rule(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid smart text regex")
}

static OPEN_DOUBLE: Lazy<Regex> = Lazy::new(|| rule(r#"(?:^|[\s{\[(<'"‘“])(")$"#));
static CLOSE_DOUBLE: Lazy<Regex> = Lazy::new(|| rule(r#"(")$"#));
static OPEN_SINGLE: Lazy<Regex> = Lazy::new(|| rule(r#"(?:^|[\s{\[(<'"‘“])(')$"#));
static CLOSE_SINGLE: Lazy<Regex> = Lazy::new(|| rule(r"(')$"));
static EM_DASH: Lazy<Regex> = Lazy::new(|| rule(r"--$"));
static ELLIPSIS: Lazy<Regex> = Lazy::new(|| rule(r"\.\.\.$"));
static RIGHT_ARROW: Lazy<Regex> = Lazy::new(|| rule(r"->$"));
static LEFT_ARROW: Lazy<Regex> = Lazy::new(|| rule(r"<-$"));
static COPYRIGHT: Lazy<Regex> = Lazy::new(|| rule(r"\([cC]\)$"));
static TRADEMARK: Lazy<Regex> = Lazy::new(|| rule(r"\([tT][mM]\)$"));

/// Typographic replacements applied while typing.
pub struct SmartText {
    options: SmartTextOptions,
}

impl SmartText {
    pub fn new(options: SmartTextOptions) -> Self {
        Self { options }
    }
}

impl Extension for SmartText {
    fn name(&self) -> &str {
        "smart_text"
    }

    fn input_rules(&self) -> Vec<InputRule> {
        let mut rules = Vec::new();
        if self.options.quotes {
            rules.push(text_rule(&OPEN_DOUBLE, "“"));
            rules.push(text_rule(&CLOSE_DOUBLE, "”"));
            rules.push(text_rule(&OPEN_SINGLE, "‘"));
            rules.push(text_rule(&CLOSE_SINGLE, "’"));
        }
        if self.options.dashes {
            rules.push(text_rule(&EM_DASH, "—"));
            rules.push(text_rule(&ELLIPSIS, "…"));
        }
        if self.options.arrows {
            rules.push(text_rule(&RIGHT_ARROW, "→"));
            rules.push(text_rule(&LEFT_ARROW, "←"));
        }
        if self.options.symbols {
            rules.push(text_rule(&COPYRIGHT, "©"));
            rules.push(text_rule(&TRADEMARK, "™"));
        }
        rules
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_groups_contribute_no_rules() {
        let all = SmartText::new(SmartTextOptions::default());
        assert_eq!(all.input_rules().len(), 10);
        let quiet = SmartText::new(SmartTextOptions {
            quotes: false,
            dashes: true,
            arrows: false,
            symbols: false,
        });
        let patterns: Vec<String> = quiet
            .input_rules()
            .iter()
            .map(|r| r.pattern.as_str().to_string())
            .collect();
        assert_eq!(patterns, vec![r"--$".to_string(), r"\.\.\.$".to_string()]);
    }

    #[test]
    fn opening_quotes_need_a_boundary() {
        assert!(OPEN_DOUBLE.is_match("say \""));
        assert!(!OPEN_DOUBLE.is_match("word\""));
        assert!(CLOSE_DOUBLE.is_match("word\""));
    }
}
