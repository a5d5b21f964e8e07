//! Folds a token stream into a document tree.

use super::tokenizer::{MarkdownTokenizer, Nesting, Token};
use super::{ParseRule, ParseTarget, ParserMode};
use crate::model::{inline, Attrs, Mark, Node};
use crate::schema::Schema;
use std::collections::HashMap;
use tracing::{debug, trace};

pub struct MarkdownParser<'a> {
    schema: &'a Schema,
    rules: &'a HashMap<String, ParseRule>,
    tokenizer: &'a MarkdownTokenizer,
}

struct Frame {
    node_type: String,
    attrs: Attrs,
    content: Vec<Node>,
}

impl<'a> MarkdownParser<'a> {
    pub fn new(
        schema: &'a Schema,
        rules: &'a HashMap<String, ParseRule>,
        tokenizer: &'a MarkdownTokenizer,
    ) -> Self {
        Self {
            schema,
            rules,
            tokenizer,
        }
    }

    /// Parse Markdown into a `doc` node. Never fails: unknown tokens are
    /// dropped and invalid structures degrade to plain paragraphs.
    pub fn parse(&self, text: &str, mode: ParserMode) -> Node {
        self.parse_tokens(self.tokenizer.tokenize(text, mode))
    }

    pub fn parse_tokens(&self, tokens: Vec<Token>) -> Node {
        let mut state = ParseState {
            schema: self.schema,
            stack: vec![Frame {
                node_type: self.schema.top_node_type().to_string(),
                attrs: Attrs::new(),
                content: Vec::new(),
            }],
            marks: Vec::new(),
        };

        for token in &tokens {
            match token.name.as_str() {
                "text" => state.add_text(&token.content),
                "softbreak" => state.add_text("\n"),
                name => match self.rules.get(name) {
                    Some(rule) => state.apply_rule(rule, token),
                    None => trace!(token = name, "Dropping token without a parse rule"),
                },
            }
        }

        while state.stack.len() > 1 {
            state.close_node();
        }
        state.finish()
    }
}

struct ParseState<'a> {
    schema: &'a Schema,
    stack: Vec<Frame>,
    marks: Vec<Mark>,
}

impl ParseState<'_> {
    fn top(&mut self) -> &mut Frame {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn allowed_marks(&self) -> Vec<Mark> {
        let Some(frame) = self.stack.last() else {
            return Vec::new();
        };
        match self.schema.node_type(&frame.node_type) {
            Some(t) => self
                .marks
                .iter()
                .filter(|m| t.allows_mark(m.mark_type()))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let marks = self.allowed_marks();
        let node = match self.schema.text(text, &marks) {
            Ok(node) => node,
            Err(err) => {
                debug!(%err, "Dropping text that could not be built");
                return;
            }
        };
        let frame = self.top();
        if let Some(last) = frame.content.last_mut() {
            if last.is_text() && last.marks() == node.marks() {
                let merged = format!("{}{}", last.text().unwrap_or(""), text);
                *last = last.with_text(merged);
                return;
            }
        }
        frame.content.push(node);
    }

    fn attrs_for(rule: &ParseRule, token: &Token) -> Attrs {
        match rule.get_attrs {
            Some(f) => f(token),
            None => token.attrs.clone(),
        }
    }

    fn apply_rule(&mut self, rule: &ParseRule, token: &Token) {
        match (&rule.target, token.nesting) {
            (ParseTarget::Ignore, _) => {}
            (ParseTarget::Block(name), Nesting::Open) => self.open_node(name, Self::attrs_for(rule, token)),
            (ParseTarget::Block(_), Nesting::Close) => self.close_node(),
            (ParseTarget::Block(name), Nesting::Leaf) => {
                self.open_node(name, Self::attrs_for(rule, token));
                if rule.no_close_token {
                    self.add_text(token.content.strip_suffix('\n').unwrap_or(&token.content));
                }
                self.close_node();
            }
            (ParseTarget::Node(name), _) => self.add_node(name, Self::attrs_for(rule, token)),
            (ParseTarget::Mark(name), Nesting::Open) => self.open_mark(name, Self::attrs_for(rule, token)),
            (ParseTarget::Mark(name), Nesting::Close) => self.close_mark(name),
            (ParseTarget::Mark(name), Nesting::Leaf) => {
                self.open_mark(name, Self::attrs_for(rule, token));
                self.add_text(&token.content);
                self.close_mark(name);
            }
        }
    }

    fn open_node(&mut self, name: &str, attrs: Attrs) {
        self.stack.push(Frame {
            node_type: name.to_string(),
            attrs,
            content: Vec::new(),
        });
    }

    fn close_node(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let inline_parent = self
            .stack
            .last()
            .is_some_and(|parent| self.schema.is_textblock(&parent.node_type));
        let is_inline = self.schema.is_inline(&frame.node_type);
        let marks = if is_inline { self.allowed_marks() } else { Vec::new() };

        match self.build(&frame) {
            Some(node) => {
                let node = if is_inline && !marks.is_empty() {
                    node.with_marks(self.schema.mark_set(&marks))
                } else {
                    node
                };
                self.top().content.push(node);
            }
            None => {
                let text = frame
                    .content
                    .iter()
                    .map(Node::text_content)
                    .collect::<Vec<_>>()
                    .join(if inline_parent { "" } else { "\n" });
                debug!(node = %frame.node_type, "Degrading invalid node to plain text");
                if text.is_empty() {
                    return;
                }
                if inline_parent {
                    self.add_text(&text);
                } else if let Ok(text) = self.schema.text(text, &[]) {
                    if let Ok(para) = self.schema.node("paragraph", Attrs::new(), vec![text]) {
                        self.top().content.push(para);
                    }
                }
            }
        }
    }

    fn build(&self, frame: &Frame) -> Option<Node> {
        let content = inline::normalize(frame.content.clone());
        if content.is_empty() {
            return self
                .schema
                .create_and_fill(&frame.node_type, frame.attrs.clone(), Vec::new())
                .ok();
        }
        self.schema
            .node(&frame.node_type, frame.attrs.clone(), content)
            .ok()
    }

    fn add_node(&mut self, name: &str, attrs: Attrs) {
        let node = match self.schema.create_and_fill(name, attrs, Vec::new()) {
            Ok(node) => node,
            Err(err) => {
                debug!(node = name, %err, "Dropping node that could not be built");
                return;
            }
        };
        let node = if self.schema.is_inline(name) {
            let marks = self.allowed_marks();
            node.with_marks(self.schema.mark_set(&marks))
        } else {
            node
        };
        self.top().content.push(node);
    }

    fn open_mark(&mut self, name: &str, attrs: Attrs) {
        match self.schema.mark(name, attrs) {
            Ok(mark) => self.marks = self.schema.add_mark(&self.marks, mark),
            Err(err) => debug!(mark = name, %err, "Ignoring mark that could not be built"),
        }
    }

    fn close_mark(&mut self, name: &str) {
        self.marks = self.schema.remove_mark(&self.marks, name);
    }

    fn finish(mut self) -> Node {
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return self.empty_doc(),
        };
        if let Some(doc) = self.build(&frame) {
            return doc;
        }
        // Keep what survives as paragraphs.
        debug!("Document content invalid, flattening to paragraphs");
        let paragraphs: Vec<Node> = frame
            .content
            .iter()
            .filter_map(|child| {
                let text = child.text_content();
                let text = self.schema.text(text, &[]).ok()?;
                self.schema.node("paragraph", Attrs::new(), vec![text]).ok()
            })
            .collect();
        self.schema
            .node(self.schema.top_node_type(), Attrs::new(), paragraphs)
            .unwrap_or_else(|_| self.empty_doc())
    }

    fn empty_doc(&self) -> Node {
        self.schema
            .create_and_fill(self.schema.top_node_type(), Attrs::new(), Vec::new())
            .unwrap_or_else(|_| Node::element(self.schema.top_node_type(), Attrs::new(), Vec::new()))
    }
}
