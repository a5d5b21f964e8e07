//! Callout containers written as `:::style … :::`.

use super::commands::{attr_string, toggle_wrap};
use crate::config::ConfigError;
use crate::editor::input_rules::wrapping_rule;
use crate::editor::{Command, InputRule};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{FenceKind, FenceRule, MarkdownRule, MarkdownSerializerState, ParseRule, Token};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static NOTICE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:::(\w+)\s$").expect("valid notice rule regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeOptions {
    pub styles: Vec<String>,
    pub default_style: String,
}

impl Default for NoticeOptions {
    fn default() -> Self {
        Self {
            styles: ["info", "warning", "tip", "success"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_style: "info".to_string(),
        }
    }
}

pub struct ContainerNotice {
    options: NoticeOptions,
}

impl ContainerNotice {
    pub fn new(options: NoticeOptions) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidOptions {
            extension: "container_notice".to_string(),
            message,
        };
        if let Some(bad) = options
            .styles
            .iter()
            .find(|s| s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_'))
        {
            return Err(invalid(format!("invalid style name {bad:?}")));
        }
        if !options.styles.contains(&options.default_style) {
            return Err(invalid(format!(
                "default style {:?} is not one of {:?}",
                options.default_style, options.styles
            )));
        }
        Ok(Self { options })
    }

    fn style_attrs(&self) -> impl Fn(&Attrs) -> Option<Attrs> + Send + Sync + 'static {
        let styles = self.options.styles.clone();
        let default = self.options.default_style.clone();
        move |attrs| {
            let style = attr_string(attrs, "style").unwrap_or_else(|| default.clone());
            styles
                .contains(&style)
                .then(|| Attrs::from([("style".to_string(), Value::from(style))]))
        }
    }
}

fn style_from_info(token: &Token) -> Attrs {
    let mut attrs = Attrs::new();
    if !token.info.is_empty() {
        attrs.insert("style".to_string(), Value::from(token.info.clone()));
    }
    attrs
}

impl Extension for ContainerNotice {
    fn name(&self) -> &str {
        "container_notice"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("block+")
                .group("block")
                .defining()
                .attr(
                    "style",
                    AttributeSpec::with_default(self.options.default_style.clone()),
                ),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let style = node
            .attr_str("style")
            .unwrap_or(&self.options.default_style)
            .to_string();
        state.write(&format!(":::{style}\n"));
        state.render_content(node)?;
        state.flush_close(1);
        state.write(":::");
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("container_notice", "container_notice").attrs(style_from_info))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Fence(FenceRule {
            fence: ":::".to_string(),
            token: "container_notice".to_string(),
            kind: FenceKind::Container,
        })]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new(
            "container_notice",
            toggle_wrap("container_notice", self.style_attrs()),
        )]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        let styles = self.options.styles.clone();
        vec![wrapping_rule(&NOTICE_RULE, "container_notice", None, move |m| {
            let style = m.captures.get(1)?.as_str();
            styles
                .iter()
                .any(|s| s == style)
                .then(|| Attrs::from([("style".to_string(), Value::from(style))]))
        })]
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_must_be_listed() {
        let options = NoticeOptions {
            styles: vec!["info".into()],
            default_style: "danger".into(),
        };
        assert!(matches!(
            ContainerNotice::new(options),
            Err(ConfigError::InvalidOptions { .. })
        ));
        assert!(ContainerNotice::new(NoticeOptions::default()).is_ok());
    }

    #[test]
    fn commands_reject_unknown_styles() {
        let notice = ContainerNotice::new(NoticeOptions::default()).unwrap();
        let attrs = notice.style_attrs();
        assert!(attrs(&Attrs::from([("style".to_string(), Value::from("nope"))])).is_none());
        assert_eq!(
            attrs(&Attrs::new()),
            Some(Attrs::from([("style".to_string(), Value::from("info"))]))
        );
    }
}
