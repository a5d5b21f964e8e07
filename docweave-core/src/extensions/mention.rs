//! References to people, pages and other entities, written as
//! `@[label](mention://type/id)`.

use super::commands::{attr_string, insert_inline};
use crate::editor::Command;
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{matching_close, MarkdownRule, MarkdownSerializerState, Nesting, ParseRule, Token, TokenTransform};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

static MENTION_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mention://([^/]+)/(.+)$").expect("valid mention href regex"));

pub struct Mention;

fn mention_attrs(kind: &str, id: &str, label: &str) -> Attrs {
    Attrs::from([
        ("type".to_string(), Value::from(kind)),
        ("id".to_string(), Value::from(id)),
        ("label".to_string(), Value::from(label)),
    ])
}

impl Extension for Mention {
    fn name(&self) -> &str {
        "mention"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .inline()
                .group("inline")
                .atom()
                .attr("type", AttributeSpec::required())
                .attr("id", AttributeSpec::required())
                .attr("label", AttributeSpec::required()),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let label = state.esc(node.attr_str("label").unwrap_or(""), false);
        let kind = node.attr_str("type").unwrap_or("");
        let id = node.attr_str("id").unwrap_or("");
        state.text(&format!("@[{label}](mention://{kind}/{id})"), false);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::node("mention", "mention"))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Transform(Arc::new(MentionTransform))]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "mention",
            insert_inline(|schema, attrs| {
                let kind = attr_string(attrs, "type").filter(|s| !s.is_empty())?;
                let id = attr_string(attrs, "id").filter(|s| !s.is_empty())?;
                let label = attr_string(attrs, "label").unwrap_or_else(|| id.clone());
                schema.node("mention", mention_attrs(&kind, &id, &label), Vec::new()).ok()
            }),
        )]
    }
}

/// Folds `@` followed by a `mention://` link into a mention token.
struct MentionTransform;

impl TokenTransform for MentionTransform {
    fn name(&self) -> &str {
        "mention"
    }

    fn transform(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let preceded_by_at = out
                .last()
                .is_some_and(|t| t.is("text", Nesting::Leaf) && t.content.ends_with('@'));
            let target = token
                .attrs
                .get("href")
                .and_then(Value::as_str)
                .and_then(|href| MENTION_HREF.captures(href));
            match (token.is("link", Nesting::Open), preceded_by_at, target) {
                (true, true, Some(caps)) => {
                    let Some(close) = matching_close(&tokens, i) else {
                        out.push(token.clone());
                        i += 1;
                        continue;
                    };
                    let label: String = tokens[i + 1..close]
                        .iter()
                        .filter(|t| t.name == "text" || t.name == "code_inline")
                        .map(|t| t.content.as_str())
                        .collect();
                    if let Some(prev) = out.last_mut() {
                        prev.content.pop();
                        if prev.content.is_empty() {
                            out.pop();
                        }
                    }
                    out.push(
                        Token::leaf("mention")
                            .with_attr("type", &caps[1])
                            .with_attr("id", &caps[2])
                            .with_attr("label", label),
                    );
                    i = close + 1;
                }
                _ => {
                    out.push(token.clone());
                    i += 1;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_sign_and_mention_link_fold_into_one_token() {
        let tokens = vec![
            Token::open("paragraph"),
            Token::text("Ping @"),
            Token::open("link").with_attr("href", "mention://user/42"),
            Token::text("Ada"),
            Token::close("link"),
            Token::close("paragraph"),
        ];
        let out = MentionTransform.transform(tokens);
        assert_eq!(
            out,
            vec![
                Token::open("paragraph"),
                Token::text("Ping "),
                Token::leaf("mention")
                    .with_attr("type", "user")
                    .with_attr("id", "42")
                    .with_attr("label", "Ada"),
                Token::close("paragraph"),
            ]
        );
    }

    #[test]
    fn ordinary_links_are_untouched() {
        let tokens = vec![
            Token::text("@"),
            Token::open("link").with_attr("href", "https://example.com"),
            Token::text("site"),
            Token::close("link"),
        ];
        assert_eq!(MentionTransform.transform(tokens.clone()), tokens);
    }
}
