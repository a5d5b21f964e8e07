//! Capability descriptors.
//!
//! An [`Extension`] is the single contract a content type implements to take
//! part in the engine. Every hook has a default, so a descriptor only
//! overrides the slots it actually fills: a node contributes a [`NodeSpec`]
//! and a `to_markdown` hook, a mark contributes a [`MarkSpec`] and delimiters,
//! and a behaviour-only extension contributes commands, keys, input rules or
//! plugins.

mod registry;

pub use registry::ExtensionRegistry;

use crate::editor::{Command, InputRule, KeyBinding, Plugin};
use crate::error::SerializeError;
use crate::markdown::{MarkToMarkdown, MarkdownRule, MarkdownSerializerState, ParseRule};
use crate::model::Node;
use crate::schema::{MarkSpec, NodeSpec};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    Node,
    Mark,
    Extension,
}

impl ExtensionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtensionKind::Node => "node",
            ExtensionKind::Mark => "mark",
            ExtensionKind::Extension => "extension",
        }
    }
}

pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ExtensionKind {
        match (self.node_spec().is_some(), self.mark_spec().is_some()) {
            (true, _) => ExtensionKind::Node,
            (_, true) => ExtensionKind::Mark,
            _ => ExtensionKind::Extension,
        }
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        None
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        None
    }

    /// Write `node` to the serializer. Node descriptors must override this.
    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        parent: &Node,
        index: usize,
    ) -> Result<(), SerializeError> {
        let _ = (state, node, parent, index);
        Err(SerializeError::MissingSerializer {
            name: self.name().to_string(),
        })
    }

    /// Delimiters for mark descriptors.
    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        None
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        None
    }

    /// Tokenizer extensions: grammar flags, block fences and token transforms.
    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        Vec::new()
    }

    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    fn keys(&self) -> Vec<KeyBinding> {
        Vec::new()
    }

    fn input_rules(&self) -> Vec<InputRule> {
        Vec::new()
    }

    /// Fresh plugin instances for one editing session.
    fn plugins(&self) -> Vec<Box<dyn Plugin>> {
        Vec::new()
    }

    /// Lets every command of this descriptor run on a read-only surface.
    fn allow_in_read_only(&self) -> bool {
        false
    }

    /// Effective options, for introspection.
    fn options(&self) -> Value {
        Value::Null
    }

    /// Release per-engine resources such as memo tables.
    fn teardown(&self) {}
}

/// Deep-merge `overrides` into `defaults`. Objects merge key by key, any
/// other value replaces the default wholesale.
pub fn merge_options(defaults: Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(mut base), Value::Object(extra)) => {
            for (key, value) in extra {
                let merged = match base.remove(key) {
                    Some(existing) => merge_options(existing, value),
                    None => value.clone(),
                };
                base.insert(key.clone(), merged);
            }
            Value::Object(base)
        }
        (defaults, Value::Null) => defaults,
        (_, overrides) => overrides.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Bare;

    impl Extension for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[test]
    fn base_serializer_names_the_descriptor() {
        use crate::markdown::{MarkdownSerializerState, SerializerOptions};
        use crate::schema::{NodeSpec, SchemaBuilder};
        use std::collections::HashMap;

        let schema = SchemaBuilder::new()
            .node("doc", NodeSpec::new().content("text*"))
            .node("text", NodeSpec::new().inline())
            .build()
            .unwrap();
        let registry = ExtensionRegistry::new(Vec::new());
        let marks = HashMap::new();
        let options = SerializerOptions::default();
        let mut state = MarkdownSerializerState::new(&registry, &marks, &schema, &options);
        let doc = schema.node("doc", Default::default(), vec![]).unwrap();

        let err = Bare.to_markdown(&mut state, &doc, &doc, 0).unwrap_err();
        assert_eq!(
            err,
            SerializeError::MissingSerializer {
                name: "bare".into()
            }
        );
        assert_eq!(Bare.kind(), ExtensionKind::Extension);
    }

    #[test]
    fn options_merge_deeply() {
        let defaults = json!({"levels": [1, 2, 3], "nested": {"a": 1, "b": 2}});
        let merged = merge_options(defaults, &json!({"nested": {"b": 5}, "extra": true}));
        assert_eq!(
            merged,
            json!({"levels": [1, 2, 3], "nested": {"a": 1, "b": 5}, "extra": true})
        );
        let replaced = merge_options(json!({"levels": [1, 2]}), &json!({"levels": [4]}));
        assert_eq!(replaced, json!({"levels": [4]}));
        assert_eq!(merge_options(json!({"a": 1}), &Value::Null), json!({"a": 1}));
    }
}
