//! TeX math: `$$` fenced blocks and `$…$` inline spans.

use super::commands::{attr_string, insert_inline, set_block};
use crate::editor::input_rules::{always_attrs, textblock_type_rule};
use crate::editor::{Command, InputRule};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{FenceKind, FenceRule, GrammarOptions, MarkdownRule, MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::NodeSpec;
use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\$\s$").expect("valid math block rule regex"));
static INLINE_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^$])(?P<full>\$(?P<latex>[^$\s](?:[^$]*[^$\s])?)\$)$").expect("valid inline math rule regex")
});

pub struct MathBlock;

impl Extension for MathBlock {
    fn name(&self) -> &str {
        "math_block"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("text*")
                .group("block")
                .marks("")
                .code()
                .defining(),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.write("$$\n");
        state.text(&node.text_content(), false);
        state.ensure_new_line();
        state.write("$$");
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("math_block", "math_block").no_close_token())
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Fence(FenceRule {
            fence: "$$".to_string(),
            token: "math_block".to_string(),
            kind: FenceKind::Leaf,
        })]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "math_block",
            set_block("math_block", true, |_| Some(Attrs::new())),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![textblock_type_rule(&BLOCK_RULE, "math_block", always_attrs)]
    }
}

pub struct MathInline;

impl Extension for MathInline {
    fn name(&self) -> &str {
        "math_inline"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("text*")
                .group("inline")
                .inline()
                .marks("")
                .code(),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        state.text(&format!("${}$", node.text_content()), false);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("math_inline", "math_inline").no_close_token())
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Options(GrammarOptions::ENABLE_MATH)]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "math_inline",
            insert_inline(|schema, attrs| {
                let latex = attr_string(attrs, "latex").filter(|l| !l.trim().is_empty())?;
                let text = schema.text(latex, &[]).ok()?;
                schema.node("math_inline", Attrs::new(), vec![text]).ok()
            }),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![InputRule::new(&INLINE_RULE, |state, m| {
            let latex = m.group("latex")?;
            let range = m.named_range("full")?.start..m.range().end;
            let schema = state.schema();
            let text = schema.text(latex, &[]).ok()?;
            let node = schema.node("math_inline", Attrs::new(), vec![text]).ok()?;
            let path = state.selection().head.path.clone();
            let allowed = schema
                .node_type(state.head_block()?.node_type())
                .is_some_and(|t| t.content_expr().allows("math_inline"));
            if !allowed {
                return None;
            }
            let mut tr = state.tr();
            tr.replace(path, range.start, range.end, vec![node]).ok()?;
            Some(tr)
        })]
    }
}
