use super::commands::{attr_string, set_block};
use crate::editor::input_rules::textblock_type_rule;
use crate::editor::{Command, InputRule, KeyBinding};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{code_fence_for, MarkdownSerializerState, ParseRule, Token};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static FENCE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```([A-Za-z0-9_+-]*)\s$").expect("valid code fence rule regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeBlockOptions {
    /// Language given to blocks created without one.
    pub default_language: Option<String>,
}

pub struct CodeBlock {
    options: CodeBlockOptions,
}

impl CodeBlock {
    pub fn new(options: CodeBlockOptions) -> Self {
        Self { options }
    }

    fn language_attrs(&self, language: Option<String>) -> Attrs {
        let language = language
            .filter(|l| !l.is_empty())
            .or_else(|| self.options.default_language.clone());
        Attrs::from([(
            "language".to_string(),
            language.map(Value::from).unwrap_or(Value::Null),
        )])
    }
}

fn language_from_info(token: &Token) -> Attrs {
    let language = if token.info.is_empty() {
        Value::Null
    } else {
        Value::from(token.info.clone())
    };
    Attrs::from([("language".to_string(), language)])
}

impl Extension for CodeBlock {
    fn name(&self) -> &str {
        "code_block"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("text*")
                .group("block")
                .marks("")
                .code()
                .defining()
                .attr("language", AttributeSpec::with_default(Value::Null)),
        )
    }

    /// Fenced with backticks, the fence growing past any backtick run in
    /// the body.
    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let body = node.text_content();
        let fence = code_fence_for(&body);
        let language = node.attr_str("language").unwrap_or("");
        state.write(&format!("{fence}{language}\n"));
        state.text(&body, false);
        state.ensure_new_line();
        state.write(&fence);
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(
            ParseRule::block("code_block", "code_block")
                .no_close_token()
                .attrs(language_from_info),
        )
    }

    fn commands(&self) -> Vec<Command> {
        let default = self.language_attrs(None);
        vec![Command::new(
            "code_block",
            set_block("code_block", true, move |attrs| {
                let mut out = default.clone();
                if let Some(language) = attr_string(attrs, "language") {
                    out.insert("language".to_string(), Value::from(language));
                }
                Some(out)
            }),
        )]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        let default = self.language_attrs(None);
        vec![KeyBinding::new(
            "Mod-Alt-c",
            set_block("code_block", true, move |_| Some(default.clone())),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        let fallback = self.options.default_language.clone();
        vec![textblock_type_rule(&FENCE_RULE, "code_block", move |m| {
            let language = m
                .captures
                .get(1)
                .map(|l| l.as_str().to_string())
                .filter(|l| !l.is_empty())
                .or_else(|| fallback.clone());
            Some(Attrs::from([(
                "language".to_string(),
                language.map(Value::from).unwrap_or(Value::Null),
            )]))
        })]
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }
}
