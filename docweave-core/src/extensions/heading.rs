use super::commands::{attr_u64, set_block};
use crate::config::ConfigError;
use crate::editor::input_rules::textblock_type_rule;
use crate::editor::{Command, InputRule, KeyBinding};
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{MarkdownSerializerState, ParseRule};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingOptions {
    /// Levels reachable through commands, keys and input rules. Parsing
    /// accepts every level regardless.
    pub levels: Vec<u8>,
}

impl Default for HeadingOptions {
    fn default() -> Self {
        Self {
            levels: vec![1, 2, 3, 4, 5, 6],
        }
    }
}

pub struct Heading {
    options: HeadingOptions,
}

impl Heading {
    pub fn new(options: HeadingOptions) -> Result<Self, ConfigError> {
        if options.levels.is_empty() || options.levels.iter().any(|l| !(1..=6).contains(l)) {
            return Err(ConfigError::InvalidOptions {
                extension: "heading".to_string(),
                message: format!("levels must be within 1..=6, got {:?}", options.levels),
            });
        }
        Ok(Self { options })
    }

    fn level_attrs(levels: Vec<u8>, default: u8) -> impl Fn(&Attrs) -> Option<Attrs> + Send + Sync + 'static {
        move |attrs| {
            let level = attr_u64(attrs, "level").unwrap_or(u64::from(default));
            if !levels.iter().any(|l| u64::from(*l) == level) {
                return None;
            }
            Some(Attrs::from([("level".to_string(), Value::from(level))]))
        }
    }
}

fn valid_level(value: &Value) -> bool {
    value.as_u64().is_some_and(|l| (1..=6).contains(&l))
}

impl Extension for Heading {
    fn name(&self) -> &str {
        "heading"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .content("inline*")
                .group("block")
                .defining()
                .attr("level", AttributeSpec::with_default(1).validate(valid_level)),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6) as usize;
        state.write(&format!("{} ", "#".repeat(level)));
        state.render_inline_from(node, false)?;
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::block("heading", "heading"))
    }

    fn commands(&self) -> Vec<Command> {
        let first = self.options.levels[0];
        vec![Command::new(
            "heading",
            set_block("heading", true, Self::level_attrs(self.options.levels.clone(), first)),
        )]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        self.options
            .levels
            .iter()
            .map(|&level| {
                KeyBinding::new(
                    format!("Mod-Alt-{level}"),
                    set_block("heading", true, Self::level_attrs(vec![level], level)),
                )
            })
            .collect()
    }

    fn input_rules(&self) -> Vec<InputRule> {
        let max = self.options.levels.iter().copied().max().unwrap_or(6);
        let Ok(pattern) = Regex::new(&format!(r"^(#{{1,{max}}})\s$")) else {
            return Vec::new();
        };
        let levels = self.options.levels.clone();
        vec![textblock_type_rule(&pattern, "heading", move |m| {
            let level = m.captures.get(1)?.as_str().len();
            levels
                .iter()
                .any(|l| usize::from(*l) == level)
                .then(|| Attrs::from([("level".to_string(), Value::from(level))]))
        })]
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }
}
