use super::commands::insert_block;
use crate::editor::{Command, InputRule, Position, Selection};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::NodeSpec;
use once_cell::sync::Lazy;
use regex::Regex;

// `—-` is what typing `---` leaves behind once smart dashes have run.
static RULE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:---|—-|___|\*\*\*)$").expect("valid horizontal rule regex"));

pub struct HorizontalRule;

impl Extension for HorizontalRule {
    fn name(&self) -> &str {
        "horizontal_rule"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().group("block"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.write("---");
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::node("hr", "horizontal_rule"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "hr",
            insert_block(|schema, _| schema.node("horizontal_rule", Attrs::new(), Vec::new()).ok()),
        )]
    }

    /// Typing a thematic break into an otherwise empty paragraph replaces
    /// it with a rule followed by a fresh paragraph.
    fn input_rules(&self) -> Vec<InputRule> {
        vec![InputRule::new(&RULE_RULE, |state, m| {
            let path = state.selection().head.path.clone();
            let block = state.doc().node_at(&path)?;
            let size: usize = block.content().iter().map(Node::inline_size).sum();
            if block.node_type() != "paragraph" || m.range().start != 0 || m.range().end != size {
                return None;
            }
            let schema = state.schema();
            let rule = schema.node("horizontal_rule", Attrs::new(), Vec::new()).ok()?;
            let paragraph = schema.node("paragraph", Attrs::new(), Vec::new()).ok()?;
            let mut tr = state.tr();
            tr.replace_node(&path, vec![rule, paragraph]).ok()?;
            let mut cursor = path;
            if let Some(last) = cursor.last_mut() {
                *last += 1;
            }
            tr.set_selection(Selection::cursor(Position::new(cursor, 0)));
            Some(tr)
        })]
    }
}
