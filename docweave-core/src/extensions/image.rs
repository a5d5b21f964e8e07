use super::commands::insert_inline;
use crate::editor::Command;
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use serde_json::Value;

pub struct Image;

/// Link destinations with whitespace need angle brackets; parentheses are
/// escaped so they cannot close the destination early.
pub(crate) fn link_destination(url: &str) -> String {
    let escaped = url.replace('(', "\\(").replace(')', "\\)");
    if escaped.chars().any(char::is_whitespace) {
        format!("<{escaped}>")
    } else {
        escaped
    }
}

pub(crate) fn link_title(title: Option<&str>) -> String {
    match title {
        Some(title) if !title.is_empty() => format!(" \"{}\"", title.replace('"', "\\\"")),
        _ => String::new(),
    }
}

impl Extension for Image {
    fn name(&self) -> &str {
        "image"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .inline()
                .group("inline")
                .atom()
                .attr("src", AttributeSpec::required())
                .attr("alt", AttributeSpec::with_default(Value::Null))
                .attr("title", AttributeSpec::with_default(Value::Null)),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let alt = state.esc(node.attr_str("alt").unwrap_or(""), false);
        let src = link_destination(node.attr_str("src").unwrap_or(""));
        let title = link_title(node.attr_str("title"));
        state.text(&format!("![{alt}]({src}{title})"), false);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::node("image", "image"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "image",
            insert_inline(|schema, attrs| {
                let src = attrs.get("src").and_then(Value::as_str).filter(|s| !s.is_empty())?;
                let mut image_attrs = Attrs::from([("src".to_string(), Value::from(src))]);
                for key in ["alt", "title"] {
                    if let Some(value) = attrs.get(key).filter(|v| v.is_string()) {
                        image_attrs.insert(key.to_string(), value.clone());
                    }
                }
                schema.node("image", image_attrs, Vec::new()).ok()
            }),
        )]
    }
}
