use super::commands::toggle_wrap;
use crate::editor::input_rules::{always_attrs, wrapping_rule};
use crate::editor::{Command, InputRule, KeyBinding};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::NodeSpec;
use once_cell::sync::Lazy;
use regex::Regex;

static QUOTE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*>\s$").expect("valid blockquote rule regex"));

pub struct Blockquote;

impl Extension for Blockquote {
    fn name(&self) -> &str {
        "blockquote"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("block+").group("block").defining())
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.wrap_block("> ", None, node, |state| state.render_content(node))
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("blockquote", "blockquote"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "blockquote",
            toggle_wrap("blockquote", |_| Some(Attrs::new())),
        )]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new(
            "Mod-Shift-b",
            toggle_wrap("blockquote", |_| Some(Attrs::new())),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![wrapping_rule(&QUOTE_RULE, "blockquote", None, always_attrs)]
    }
}
