//! Rich embeds for known media providers.
//!
//! An embed is written as a paragraph holding nothing but a link to the
//! media. On parse, such a paragraph becomes an embed when the link target
//! matches one of the configured provider patterns.

use super::commands::{attr_string, insert_block};
use crate::config::ConfigError;
use crate::editor::Command;
use crate::error::SerializeError;
use crate::extension::Extension;
use crate::markdown::{matching_close, MarkdownRule, MarkdownSerializerState, Nesting, ParseRule, Token, TokenTransform};
use crate::model::{Attrs, Node};
use crate::schema::{AttributeSpec, NodeSpec};
use super::image::link_destination;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

const MEMO_CAPACITY: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedOptions {
    /// Regular expressions matched against link targets.
    pub providers: Vec<String>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            providers: vec![
                r"^https?://(?:www\.)?youtube\.com/watch\?v=[\w-]+".to_string(),
                r"^https?://youtu\.be/[\w-]+".to_string(),
                r"^https?://(?:www\.)?vimeo\.com/\d+".to_string(),
            ],
        }
    }
}

/// Provider patterns with a bounded memo of recently classified URLs.
#[derive(Debug)]
struct EmbedMatcher {
    patterns: Vec<Regex>,
    memo: Mutex<LruCache<String, bool>>,
}

impl EmbedMatcher {
    fn matches(&self, href: &str) -> bool {
        if let Some(&known) = self.memo.lock().get(href) {
            return known;
        }
        let matched = self.patterns.iter().any(|p| p.is_match(href));
        self.memo.lock().put(href.to_string(), matched);
        matched
    }
}

pub struct Embed {
    options: EmbedOptions,
    matcher: Arc<EmbedMatcher>,
}

impl Embed {
    pub fn new(options: EmbedOptions) -> Result<Self, ConfigError> {
        let patterns = options
            .providers
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ConfigError::InvalidOptions {
                extension: "embed".to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            options,
            matcher: Arc::new(EmbedMatcher {
                patterns,
                memo: Mutex::new(LruCache::new(
                    NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
                )),
            }),
        })
    }

    /// Whether `href` points at a configured provider.
    pub fn matches(&self, href: &str) -> bool {
        self.matcher.matches(href)
    }
}

impl Extension for Embed {
    fn name(&self) -> &str {
        "embed"
    }

    fn node_spec(&self) -> Option<NodeSpec> {
        Some(
            NodeSpec::new()
                .group("block")
                .atom()
                .attr("href", AttributeSpec::required()),
        )
    }

    fn to_markdown(
        &self,
        state: &mut MarkdownSerializerState<'_>,
        node: &Node,
        _parent: &Node,
        _index: usize,
    ) -> Result<(), SerializeError> {
        let href = node.attr_str("href").unwrap_or("");
        let label = state.esc(href, false);
        state.text(&format!("[{label}]({})", link_destination(href)), false);
        state.close_block(node);
        Ok(())
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::node("embed", "embed"))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Transform(Arc::new(EmbedTransform {
            matcher: Arc::clone(&self.matcher),
        }))]
    }

    fn commands(&self) -> Vec<Command> {
        let matcher = Arc::clone(&self.matcher);
        vec![Command::new(
            "embed",
            insert_block(move |schema, attrs| {
                let href = attr_string(attrs, "href").filter(|h| matcher.matches(h))?;
                schema
                    .node("embed", Attrs::from([("href".to_string(), Value::from(href))]), Vec::new())
                    .ok()
            }),
        )]
    }

    fn options(&self) -> Value {
        serde_json::to_value(&self.options).unwrap_or(Value::Null)
    }

    fn teardown(&self) {
        let mut memo = self.matcher.memo.lock();
        debug!(entries = memo.len(), "Clearing embed memo");
        memo.clear();
    }
}

/// Rewrites `paragraph > link(provider url)` into an embed token.
struct EmbedTransform {
    matcher: Arc<EmbedMatcher>,
}

impl EmbedTransform {
    /// End index of the paragraph at `start` when it holds only a
    /// provider link.
    fn embed_at(&self, tokens: &[Token], start: usize) -> Option<(usize, String)> {
        if !tokens.get(start)?.is("paragraph", Nesting::Open) {
            return None;
        }
        let link = tokens.get(start + 1)?;
        if !link.is("link", Nesting::Open) {
            return None;
        }
        let href = link.attrs.get("href").and_then(Value::as_str)?;
        let link_close = matching_close(tokens, start + 1)?;
        let end = link_close + 1;
        if !tokens.get(end)?.is("paragraph", Nesting::Close) || !self.matcher.matches(href) {
            return None;
        }
        Some((end, href.to_string()))
    }
}

impl TokenTransform for EmbedTransform {
    fn name(&self) -> &str {
        "embed"
    }

    fn transform(&self, tokens: Vec<Token>) -> Vec<Token> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            match self.embed_at(&tokens, i) {
                Some((end, href)) => {
                    out.push(Token::leaf("embed").with_attr("href", href));
                    i = end + 1;
                }
                None => {
                    out.push(tokens[i].clone());
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

    fn link_paragraph(href: &str) -> Vec<Token> {
        vec![
            Token::open("paragraph"),
            Token::open("link").with_attr("href", href),
            Token::text(href),
            Token::close("link"),
            Token::close("paragraph"),
        ]
    }

    #[test]
    fn provider_links_alone_in_a_paragraph_become_embeds() {
        let embed = Embed::new(EmbedOptions::default()).unwrap();
        let transform = EmbedTransform {
            matcher: Arc::clone(&embed.matcher),
        };
        let out = transform.transform(link_paragraph("https://youtu.be/abc123"));
        assert_eq!(
            out,
            vec![Token::leaf("embed").with_attr("href", "https://youtu.be/abc123")]
        );

        let other = link_paragraph("https://example.com/page");
        assert_eq!(transform.transform(other.clone()), other);
    }

    #[test]
    fn invalid_provider_patterns_are_rejected() {
        let options = EmbedOptions {
            providers: vec!["(unclosed".to_string()],
        };
        assert!(matches!(
            Embed::new(options),
            Err(ConfigError::InvalidOptions { .. })
        ));
    }

    #[test]
    fn memo_keeps_only_recent_urls() {
        let embed = Embed::new(EmbedOptions::default()).unwrap();
        for i in 0..MEMO_CAPACITY + 10 {
            embed.matches(&format!("https://example.com/{i}"));
        }
        assert_eq!(embed.matcher.memo.lock().len(), MEMO_CAPACITY);
        assert!(embed.matcher.memo.lock().peek("https://example.com/0").is_none());
        assert!(embed.matches("https://youtu.be/abc"));
    }

    #[test]
    fn teardown_clears_the_memo() {
        let embed = Embed::new(EmbedOptions::default()).unwrap();
        assert!(embed.matches("https://vimeo.com/1234"));
        assert!(!embed.matches("https://example.com"));
        assert_eq!(embed.matcher.memo.lock().len(), 2);
        embed.teardown();
        assert!(embed.matcher.memo.lock().is_empty());
    }
}
