//! Bullet, ordered and checkbox lists.
//!
//! Checkbox lists ride on pulldown-cmark's task list markers: a bullet list
//! whose every item starts with a marker is rewritten into a
//! `checkbox_list` before parsing.

use super::commands::{ancestor_of_type, lift_item, sink_item, toggle_list};
use crate::editor::input_rules::{always_attrs, wrapping_rule};
use crate::editor::{command_fn, emit, Command, CommandFn, InputRule, InputMatch, KeyBinding};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{
    matching_close, GrammarOptions, MarkdownRule, MarkdownSerializerState, Nesting, ParseRule, Token,
    TokenTransform,
};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

static BULLET_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([-+*])\s$").expect("valid bullet list rule regex"));
static ORDERED_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.\s$").expect("valid ordered list rule regex"));
static CHECKBOX_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[([ xX])?\]\s$").expect("valid checkbox rule regex"));

const CONSUMED_MARKER: &str = "task_marker_consumed";

const BULLETS: [&str; 3] = ["-", "*", "+"];

/// Bullet and checkbox lists share markers, so either kind switches to
/// another bullet when it directly follows a list that used the same one.
fn write_bullet_list(state: &mut MarkdownSerializerState<'_>, node: &Node) -> Result<(), SerializeError> {
    let preferred = state.options().bullet.clone();
    let bullet = state.list_marker(&preferred, &BULLETS).to_string();
    let delim = " ".repeat(bullet.chars().count() + 1);
    state.render_list(node, &bullet, &delim, |_| format!("{bullet} "))
}

fn list_item_spec() -> NodeSpec {
    NodeSpec::new().content("paragraph block*").defining()
}

fn lift_command() -> CommandFn {
    command_fn(|state, _, dispatch| lift_item(state, dispatch))
}

fn sink_command() -> CommandFn {
    command_fn(|state, _, dispatch| sink_item(state, dispatch))
}

pub struct BulletList;

impl Extension for BulletList {
    fn name(&self) -> &str {
        "bullet_list"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("list_item+").group("block list"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        write_bullet_list(state, node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("bullet_list", "bullet_list"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("bullet_list", toggle_list("bullet_list", "list_item"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-Shift-8", toggle_list("bullet_list", "list_item"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![wrapping_rule(&BULLET_RULE, "bullet_list", Some("list_item"), always_attrs)]
    }
}

pub struct OrderedList;

fn ordered_attrs(m: &InputMatch<'_>) -> Option<Attrs> {
    let start: u64 = m.captures.get(1)?.as_str().parse().ok()?;
    Some(Attrs::from([("start".to_string(), Value::from(start))]))
}

impl Extension for OrderedList {
    fn name(&self) -> &str {
        "ordered_list"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("list_item+")
                .group("block list")
                .attr("start", AttributeSpec::with_default(1)),
        )
    }

    /// Numbers are right-aligned so every item's content starts in the same
    /// column.
    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let start = node.attr_u64("start").unwrap_or(1);
        let last = start + node.child_count().saturating_sub(1) as u64;
        let width = last.to_string().len();
        let delim = " ".repeat(width + 2);
        let separator = state.list_marker(".", &[")"]).to_string();
        state.render_list(node, &separator, &delim, |i| {
            let number = (start + i as u64).to_string();
            format!("{}{number}{separator} ", " ".repeat(width - number.len()))
        })
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("ordered_list", "ordered_list"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("ordered_list", toggle_list("ordered_list", "list_item"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-Shift-7", toggle_list("ordered_list", "list_item"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![wrapping_rule(&ORDERED_RULE, "ordered_list", Some("list_item"), ordered_attrs)]
    }
}

pub struct ListItem;

impl Extension for ListItem {
    fn name(&self) -> &str {
        "list_item"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(list_item_spec())
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.render_content(node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("list_item", "list_item"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("sink_list_item", sink_command()),
            Command::new("lift_list_item", lift_command()),
        ]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![
            KeyBinding::new("Tab", sink_command()),
            KeyBinding::new("Shift-Tab", lift_command()),
        ]
    }
}

pub struct CheckboxList;

impl Extension for CheckboxList {
    fn name(&self) -> &str {
        "checkbox_list"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("checkbox_item+").group("block list"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        write_bullet_list(state, node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("checkbox_list", "checkbox_list"))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![
            MarkdownRule::Options(GrammarOptions::ENABLE_TASKLISTS),
            MarkdownRule::Transform(Arc::new(CheckboxTransform)),
        ]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "checkbox_list",
            toggle_list("checkbox_list", "checkbox_item"),
        )]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new(
            "Mod-Shift-9",
            toggle_list("checkbox_list", "checkbox_item"),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![InputRule::new(&CHECKBOX_RULE, |state, m| {
            let range = m.range();
            if range.start != 0 {
                return None;
            }
            let checked = m
                .captures
                .get(1)
                .is_some_and(|c| c.as_str().eq_ignore_ascii_case("x"));
            let path = state.selection().head.path.clone();
            let mut tr = state.tr();
            tr.replace(path.clone(), range.start, range.end, Vec::new()).ok()?;
            tr.wrap_block(&path, "checkbox_list", Attrs::new(), Some("checkbox_item"))
                .ok()?;
            if checked {
                let mut item = path;
                item.push(0);
                tr.set_node_attrs(&item, Attrs::from([("checked".to_string(), Value::Bool(true))]))
                    .ok()?;
            }
            Some(tr)
        })]
    }
}

pub struct CheckboxItem;

impl CheckboxItem {
    fn toggle() -> CommandFn {
        command_fn(|state, _, dispatch| {
            let doc = state.doc();
            let Some(path) = ancestor_of_type(doc, &state.selection().head.path, &["checkbox_item"]) else {
                return false;
            };
            let Some(item) = doc.node_at(&path) else {
                return false;
            };
            let mut attrs = item.attrs().clone();
            attrs.insert("checked".to_string(), Value::Bool(!item.attr_bool("checked")));
            let mut tr = state.tr();
            if tr.set_node_attrs(&path, attrs).is_err() {
                return false;
            }
            emit(dispatch, tr)
        })
    }
}

impl Extension for CheckboxItem {
    fn name(&self) -> &str {
        "checkbox_item"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(list_item_spec().attr("checked", AttributeSpec::with_default(false)))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.write(if node.attr_bool("checked") { "[x] " } else { "[ ] " });
        state.render_content(node)
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("checkbox_item", "checkbox_item"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("toggle_checkbox", Self::toggle())]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-Enter", Self::toggle())]
    }
}

/// Index of the task marker at the start of the item opened at `open`: it
/// precedes the implicit paragraph of a tight item and follows the
/// paragraph of a loose one.
fn marker_of(tokens: &[Token], open: usize) -> Option<usize> {
    let next = tokens.get(open + 1)?;
    if next.name == "task_marker" {
        return Some(open + 1);
    }
    if next.is("paragraph", Nesting::Open) && tokens.get(open + 2)?.name == "task_marker" {
        return Some(open + 2);
    }
    None
}

/// `(open, close)` indices of the items directly inside the list opened at
/// `open`.
fn direct_items(tokens: &[Token], open: usize, close: usize) -> Vec<(usize, usize)> {
    let mut items = Vec::new();
    let mut k = open + 1;
    while k < close {
        if tokens[k].is("list_item", Nesting::Open) {
            let end = matching_close(tokens, k).unwrap_or(close);
            items.push((k, end));
            k = end + 1;
        } else {
            k += 1;
        }
    }
    items
}

struct CheckboxTransform;

impl TokenTransform for CheckboxTransform {
    fn name(&self) -> &str {
        "checkbox_list"
    }

    fn transform(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        for i in 0..tokens.len() {
            if !tokens[i].is("bullet_list", Nesting::Open) {
                continue;
            }
            let Some(close) = matching_close(&tokens, i) else {
                continue;
            };
            let items = direct_items(&tokens, i, close);
            let markers: Vec<Option<usize>> = items.iter().map(|&(open, _)| marker_of(&tokens, open)).collect();
            if items.is_empty() || markers.iter().any(Option::is_none) {
                continue;
            }
            tokens[i].name = "checkbox_list".to_string();
            tokens[close].name = "checkbox_list".to_string();
            for (&(open, end), marker) in items.iter().zip(markers.into_iter().flatten()) {
                let checked = tokens[marker]
                    .attrs
                    .get("checked")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                tokens[open].name = "checkbox_item".to_string();
                tokens[open].attrs.insert("checked".to_string(), Value::Bool(checked));
                tokens[end].name = "checkbox_item".to_string();
                tokens[marker].name = CONSUMED_MARKER.to_string();
            }
        }

        // Markers in mixed lists go back to literal text at the start of
        // their paragraph.
        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut pending: Option<&'static str> = None;
        for token in tokens {
            if token.name == CONSUMED_MARKER {
                continue;
            }
            if token.name == "task_marker" {
                let checked = token.attrs.get("checked").and_then(Value::as_bool).unwrap_or(false);
                let literal = if checked { "[x] " } else { "[ ] " };
                if out.last().is_some_and(|t| t.is("paragraph", Nesting::Open)) {
                    out.push(Token::text(literal));
                } else {
                    pending = Some(literal);
                }
                continue;
            }
            let opens_paragraph = token.is("paragraph", Nesting::Open);
            out.push(token);
            if opens_paragraph {
                if let Some(literal) = pending.take() {
                    out.push(Token::text(literal));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(checked: Option<bool>, text: &str, tight: bool) -> Vec<Token> {
        let marker = checked.map(|c| Token::leaf("task_marker").with_attr("checked", c));
        let mut tokens = vec![Token::open("list_item")];
        if tight {
            tokens.extend(marker.clone());
            tokens.push(Token::open("paragraph"));
        } else {
            tokens.push(Token::open("paragraph"));
            tokens.extend(marker);
        }
        tokens.push(Token::text(text));
        tokens.push(Token::close("paragraph"));
        tokens.push(Token::close("list_item"));
        tokens
    }

    fn list(items: Vec<Vec<Token>>) -> Vec<Token> {
        let mut tokens = vec![Token::open("bullet_list")];
        tokens.extend(items.into_iter().flatten());
        tokens.push(Token::close("bullet_list"));
        tokens
    }

    #[test]
    fn all_marked_items_become_checkboxes() {
        let tokens = list(vec![item(Some(true), "done", true), item(Some(false), "todo", false)]);
        let out = CheckboxTransform.transform(tokens);
        assert!(out[0].is("checkbox_list", Nesting::Open));
        assert!(out[1].is("checkbox_item", Nesting::Open));
        assert_eq!(out[1].attrs.get("checked"), Some(&Value::Bool(true)));
        assert!(out.iter().all(|t| t.name != "task_marker" && t.name != CONSUMED_MARKER));
        assert!(out.last().is_some_and(|t| t.is("checkbox_list", Nesting::Close)));
    }

    #[test]
    fn mixed_lists_keep_markers_as_text() {
        let tokens = list(vec![item(Some(true), "done", true), item(None, "plain", true)]);
        let out = CheckboxTransform.transform(tokens);
        assert!(out[0].is("bullet_list", Nesting::Open));
        assert!(out[2].is("paragraph", Nesting::Open));
        assert_eq!(out[3].content, "[x] ");
        assert_eq!(out[4].content, "done");
    }
}
