//! The document skeleton: `doc`, `text`, `paragraph` and `hard_break`.

use super::commands::set_block;
use crate::editor::{command_fn, emit, Command, KeyBinding};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::NodeSpec;

pub struct Doc;

impl Extension for Doc {
    fn name(&self) -> &str {
        "doc"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("block+"))
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
}

pub struct Text;

impl Extension for Text {
    fn name(&self) -> &str {
        "text"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().inline().group("inline"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.text(node.text().unwrap_or(""), true);
        Ok(())
    }
}

/// The default block. Registered as the first member of `block`, so empty
/// documents are filled with one.
pub struct Paragraph;

impl Extension for Paragraph {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().content("inline*").group("block"))
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.render_inline(node)?;
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("paragraph", "paragraph"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "paragraph",
            set_block("paragraph", false, |_| Some(Attrs::new())),
        )]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new(
            "Mod-Alt-0",
            set_block("paragraph", false, |_| Some(Attrs::new())),
        )]
    }
}

pub struct HardBreak;

impl HardBreak {
    fn command() -> crate::editor::CommandFn {
        command_fn(|state, _, dispatch| {
            if !state.selection().is_in_one_block() {
                return false;
            }
            let schema = state.schema();
            let Some(block) = state.head_block() else {
                return false;
            };
            let mut tr = state.tr();
            let result = if schema.is_code(block.node_type()) {
                tr.insert_text("\n", &[]).map(|_| ())
            } else {
                let allowed = schema
                    .node_type(block.node_type())
                    .is_some_and(|t| t.content_expr().allows("hard_break"));
                if !allowed {
                    return false;
                }
                match schema.node("hard_break", Attrs::new(), Vec::new()) {
                    Ok(node) => tr.insert_inline(node).map(|_| ()),
                    Err(_) => return false,
                }
            };
            if result.is_err() {
                return false;
            }
            emit(dispatch, tr)
        })
    }
}

impl Extension for HardBreak {
    fn name(&self) -> &str {
        "hard_break"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(NodeSpec::new().inline().group("inline"))
    }

    /// A backslash line break, only written when something other than a
    /// break follows. Tables cannot hold newlines and get `<br>` instead.
    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        parent: &Node,
        index: usize,
    ) -> Result<(), SerializeError> {
        let followed = parent
            .content()
            .iter()
            .skip(index + 1)
            .any(|n| n.node_type() != node.node_type());
        if !followed {
            return Ok(());
        }
        if state.in_table() {
            state.text("<br>", false);
        } else {
            state.write("\\\n");
        }
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::node("hardbreak", "hard_break"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("hard_break", Self::command())]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Shift-Enter", Self::command())]
    }
}
