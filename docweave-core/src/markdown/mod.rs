//! Markdown round trip.
//!
//! Serialization walks the tree through each node descriptor's
//! `to_markdown` hook. Parsing tokenizes with pulldown-cmark (plus block
//! fences and token transforms contributed by descriptors) and folds the
//! token stream through [`ParseRule`]s.

mod parser;
mod serializer;
mod tokenizer;

pub use parser::MarkdownParser;
pub use serializer::{backticks_for, code_fence_for, MarkdownSerializer, MarkdownSerializerState};
pub use tokenizer::{MarkdownTokenizer, Nesting, Token};
pub(crate) use tokenizer::matching_close;

use crate::model::{Attrs, Mark, Node};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use pulldown_cmark::Options as GrammarOptions;

/// Options that shape serializer output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerOptions {
    /// Bullet marker for bullet and checkbox lists.
    pub bullet: String,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            bullet: "-".to_string(),
        }
    }
}

pub type DelimiterFn = Arc<dyn Fn(&Mark, &Node, usize) -> String + Send + Sync>;

/// Opening or closing delimiter of a mark.
#[derive(Clone)]
pub enum Delimiter {
    Static(String),
    /// Computed from the mark, the inline parent and the child index.
    Dynamic(DelimiterFn),
}

impl Delimiter {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Mark, &Node, usize) -> String + Send + Sync + 'static,
    {
        Delimiter::Dynamic(Arc::new(f))
    }

    pub(crate) fn render(&self, mark: &Mark, parent: &Node, index: usize) -> String {
        match self {
            Delimiter::Static(s) => s.clone(),
            Delimiter::Dynamic(f) => f(mark, parent, index),
        }
    }
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Static(s.to_string())
    }
}

impl fmt::Debug for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Static(s) => write!(f, "{s:?}"),
            Delimiter::Dynamic(_) => f.write_str("<dynamic>"),
        }
    }
}

/// How a mark is written to Markdown.
#[derive(Debug, Clone)]
pub struct MarkToMarkdown {
    pub open: Delimiter,
    pub close: Delimiter,
    /// Open/close order relative to other mixable marks may be rotated.
    pub mixable: bool,
    /// Leading and trailing whitespace is moved outside the delimiters.
    pub expel_enclosing_whitespace: bool,
    /// `false` writes covered text verbatim; such a mark must be innermost.
    pub escape: bool,
}

impl MarkToMarkdown {
    pub fn new(open: impl Into<Delimiter>, close: impl Into<Delimiter>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
            mixable: false,
            expel_enclosing_whitespace: false,
            escape: true,
        }
    }

    pub fn mixable(mut self) -> Self {
        self.mixable = true;
        self
    }

    pub fn expel_enclosing_whitespace(mut self) -> Self {
        self.expel_enclosing_whitespace = true;
        self
    }

    pub fn no_escape(mut self) -> Self {
        self.escape = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseTarget {
    /// Open/close token pair producing a node (or a leaf token whose
    /// content becomes the node's text when `no_close_token` is set).
    Block(String),
    /// A leaf token producing an atom node.
    Node(String),
    /// Open/close token pair (or a leaf carrying text) producing a mark.
    Mark(String),
    /// The token itself is dropped; nested tokens are still processed.
    Ignore,
}

/// Declarative rule mapping a token name to a node or mark.
#[derive(Debug, Clone)]
pub struct ParseRule {
    pub token: String,
    pub target: ParseTarget,
    pub get_attrs: Option<fn(&Token) -> Attrs>,
    pub no_close_token: bool,
}

impl ParseRule {
    pub fn block(token: &str, node: &str) -> Self {
        Self::with_target(token, ParseTarget::Block(node.to_string()))
    }

    pub fn node(token: &str, node: &str) -> Self {
        Self::with_target(token, ParseTarget::Node(node.to_string()))
    }

    pub fn mark(token: &str, mark: &str) -> Self {
        Self::with_target(token, ParseTarget::Mark(mark.to_string()))
    }

    pub fn ignore(token: &str) -> Self {
        Self::with_target(token, ParseTarget::Ignore)
    }

    fn with_target(token: &str, target: ParseTarget) -> Self {
        Self {
            token: token.to_string(),
            target,
            get_attrs: None,
            no_close_token: false,
        }
    }

    pub fn attrs(mut self, f: fn(&Token) -> Attrs) -> Self {
        self.get_attrs = Some(f);
        self
    }

    pub fn no_close_token(mut self) -> Self {
        self.no_close_token = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceKind {
    /// Body is kept verbatim as the token's content.
    Leaf,
    /// Body is tokenized recursively between open and close tokens.
    Container,
}

/// A line-delimited block such as `$$ … $$` or `:::info … :::`, recognised
/// before pulldown-cmark sees the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceRule {
    pub fence: String,
    pub token: String,
    pub kind: FenceKind,
}

/// Rewrites the token stream after tokenization.
pub trait TokenTransform: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, tokens: Vec<Token>) -> Vec<Token>;
}

/// Tokenizer hook contributed by a descriptor.
#[derive(Clone)]
pub enum MarkdownRule {
    Options(GrammarOptions),
    Fence(FenceRule),
    Transform(Arc<dyn TokenTransform>),
}

impl fmt::Debug for MarkdownRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkdownRule::Options(o) => f.debug_tuple("Options").field(o).finish(),
            MarkdownRule::Fence(r) => f.debug_tuple("Fence").field(r).finish(),
            MarkdownRule::Transform(t) => f.debug_tuple("Transform").field(&t.name()).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    #[default]
    Document,
    /// Block-level syntax at line starts is read as plain text.
    Paste,
}
