//! The engine: descriptors aggregated into a schema, a Markdown round trip
//! and the command, key and input-rule tables.

use crate::config::{ConfigError, EngineConfig};
use crate::editor::{CommandTable, EditorState, InputRuleTable, Keymap};
use crate::error::{SchemaError, SerializeError};
use crate::extension::{Extension, ExtensionRegistry};
use crate::extensions;
use crate::markdown::{
    MarkToMarkdown, MarkdownParser, MarkdownRule, MarkdownSerializer, MarkdownTokenizer, ParseRule,
    ParserMode, SerializerOptions, Token,
};
use crate::model::{Attrs, Node};
use crate::schema::Schema;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub struct Engine {
    registry: ExtensionRegistry,
    schema: Arc<Schema>,
    mark_markdown: HashMap<String, MarkToMarkdown>,
    parse_rules: HashMap<String, ParseRule>,
    tokenizer: MarkdownTokenizer,
    commands: CommandTable,
    keymap: Keymap,
    input_rules: InputRuleTable,
    serializer_options: SerializerOptions,
    editable: bool,
}

impl Engine {
    pub fn new(extensions: Vec<Box<dyn Extension>>) -> Result<Self, SchemaError> {
        Self::with_options(extensions, SerializerOptions::default())
    }

    /// Engine over every built-in descriptor with default options.
    pub fn with_defaults() -> Result<Self, SchemaError> {
        Self::new(extensions::default_extensions())
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut engine = Self::with_options(config.build_extensions()?, config.serializer.clone())?;
        engine.editable = config.editable;
        Ok(engine)
    }

    pub fn with_options(
        extensions: Vec<Box<dyn Extension>>,
        serializer_options: SerializerOptions,
    ) -> Result<Self, SchemaError> {
        let registry = ExtensionRegistry::new(extensions);
        let schema = Arc::new(Schema::from_extensions(registry.as_slice())?);

        let mut mark_markdown = HashMap::new();
        let mut parse_rules: HashMap<String, ParseRule> = HashMap::new();
        let mut tokenizer = MarkdownTokenizer::new();
        let mut commands = CommandTable::new();
        let mut keymap = Keymap::new();
        let mut input_rules = InputRuleTable::new();

        for extension in registry.iter() {
            if let Some(spec) = extension.mark_to_markdown() {
                mark_markdown.insert(extension.name().to_string(), spec);
            }
            if let Some(rule) = extension.parse_markdown() {
                if parse_rules.contains_key(&rule.token) {
                    debug!(token = %rule.token, extension = extension.name(), "Parse rule overridden");
                }
                parse_rules.insert(rule.token.clone(), rule);
            }
            for rule in extension.markdown_rules() {
                match rule {
                    MarkdownRule::Options(options) => tokenizer.enable(options),
                    MarkdownRule::Fence(fence) => tokenizer.add_fence(fence),
                    MarkdownRule::Transform(transform) => tokenizer.add_transform(transform),
                }
            }
            let read_only = extension.allow_in_read_only();
            for command in extension.commands() {
                commands.insert(if read_only { command.read_only() } else { command });
            }
            for binding in extension.keys() {
                keymap.insert(if read_only { binding.read_only() } else { binding });
            }
            for rule in extension.input_rules() {
                input_rules.insert(rule);
            }
        }

        debug!(
            extensions = registry.len(),
            commands = commands.len(),
            keys = keymap.len(),
            input_rules = input_rules.len(),
            "Engine assembled"
        );

        Ok(Self {
            registry,
            schema,
            mark_markdown,
            parse_rules,
            tokenizer,
            commands,
            keymap,
            input_rules,
            serializer_options,
            editable: true,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    pub fn input_rules(&self) -> &InputRuleTable {
        &self.input_rules
    }

    pub fn tokenizer(&self) -> &MarkdownTokenizer {
        &self.tokenizer
    }

    pub fn serializer_options(&self) -> &SerializerOptions {
        &self.serializer_options
    }

    pub fn editable(&self) -> bool {
        self.editable
    }

    pub fn serialize(&self, doc: &Node) -> Result<String, SerializeError> {
        MarkdownSerializer::new(
            &self.registry,
            &self.mark_markdown,
            &self.schema,
            &self.serializer_options,
        )
        .with_grammar(self.tokenizer.options())
        .serialize(doc)
    }

    /// Parse a Markdown document. Never fails.
    pub fn parse(&self, markdown: &str) -> Node {
        self.parser().parse(markdown, ParserMode::Document)
    }

    /// Parse pasted text into top-level nodes. Block syntax at line starts
    /// is kept literal; text that yields nothing structured becomes plain
    /// paragraphs.
    pub fn parse_paste(&self, text: &str) -> Vec<Node> {
        let doc = self.parser().parse(text, ParserMode::Paste);
        let content = doc.into_content();
        let empty = content
            .iter()
            .all(|n| n.node_type() == "paragraph" && n.child_count() == 0);
        if empty && !text.trim().is_empty() {
            debug!("Paste produced no structure, falling back to plain text");
            return self.plain_paragraphs(text);
        }
        content
    }

    fn plain_paragraphs(&self, text: &str) -> Vec<Node> {
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let text = self.schema.text(line, &[]).ok()?;
                self.schema.node("paragraph", Attrs::new(), vec![text]).ok()
            })
            .collect()
    }

    /// Parse then serialize: the canonical form of a Markdown document.
    pub fn normalize(&self, markdown: &str) -> Result<String, SerializeError> {
        self.serialize(&self.parse(markdown))
    }

    pub fn tokenize(&self, markdown: &str, mode: ParserMode) -> Vec<Token> {
        self.tokenizer.tokenize(markdown, mode)
    }

    pub fn create_state(&self, doc: Node) -> EditorState {
        EditorState::new(self.schema.clone(), doc)
    }

    /// Release per-engine resources held by descriptors.
    pub fn teardown(&self) {
        for extension in self.registry.iter() {
            extension.teardown();
        }
    }

    fn parser(&self) -> MarkdownParser<'_> {
        MarkdownParser::new(&self.schema, &self.parse_rules, &self.tokenizer)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("extensions", &self.registry.names())
            .field("commands", &self.commands.len())
            .field("keys", &self.keymap.len())
            .field("input_rules", &self.input_rules.len())
            .finish()
    }
}
