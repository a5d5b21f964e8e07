//! Token stream construction.
//!
//! Three passes: block fences contributed by descriptors are cut out of the
//! source first (never inside fenced code), pulldown-cmark events are then
//! flattened into open/close/leaf tokens, and finally the registered token
//! transforms rewrite the stream. Fences nested in block quotes or list
//! items are found by tokenizing each container's body as a document of its
//! own once its line prefixes are stripped.

use super::{FenceKind, FenceRule, GrammarOptions, ParserMode, TokenTransform};
use crate::model::Attrs;
use once_cell::sync::Lazy;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

static BR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^<br\s*/?>$").expect("valid br regex"));
static PASTE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s{0,3})(#{1,6}(?:\s|$)|>|[-+*](?:\s|$)|\d{1,9}[.)](?:\s|$)|(?:[-*_=]\s*){3,}$)")
        .expect("valid paste block regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Nesting {
    Open,
    Close,
    Leaf,
}

/// A markdown-it style token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub name: String,
    pub nesting: Nesting,
    #[serde(skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub info: String,
}

impl Token {
    pub fn open(name: &str) -> Self {
        Self::new(name, Nesting::Open)
    }

    pub fn close(name: &str) -> Self {
        Self::new(name, Nesting::Close)
    }

    pub fn leaf(name: &str) -> Self {
        Self::new(name, Nesting::Leaf)
    }

    fn new(name: &str, nesting: Nesting) -> Self {
        Self {
            name: name.to_string(),
            nesting,
            attrs: Attrs::new(),
            content: String::new(),
            info: String::new(),
        }
    }

    pub fn text(content: &str) -> Self {
        Self::leaf("text").with_content(content)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn with_info(mut self, info: &str) -> Self {
        self.info = info.to_string();
        self
    }

    pub fn is(&self, name: &str, nesting: Nesting) -> bool {
        self.name == name && self.nesting == nesting
    }
}

/// Index of the token closing the one opened at `open`.
pub(crate) fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.nesting {
            Nesting::Open => depth += 1,
            Nesting::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            Nesting::Leaf => {}
        }
    }
    None
}

/// Tokenizer assembled from the descriptors' markdown rules.
#[derive(Clone)]
pub struct MarkdownTokenizer {
    options: GrammarOptions,
    fences: Vec<FenceRule>,
    transforms: Vec<Arc<dyn TokenTransform>>,
}

impl std::fmt::Debug for MarkdownTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownTokenizer")
            .field("options", &self.options)
            .field("fences", &self.fences)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

enum Segment {
    Markdown(String),
    Leaf { token: String, info: String, body: String },
    Container { token: String, info: String, body: String },
}

impl Default for MarkdownTokenizer {
    fn default() -> Self {
        Self {
            options: GrammarOptions::empty(),
            fences: Vec::new(),
            transforms: Vec::new(),
        }
    }
}

impl MarkdownTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, options: GrammarOptions) {
        self.options.insert(options);
    }

    pub fn add_fence(&mut self, rule: FenceRule) {
        self.fences.push(rule);
    }

    pub fn add_transform(&mut self, transform: Arc<dyn TokenTransform>) {
        self.transforms.push(transform);
    }

    pub fn options(&self) -> GrammarOptions {
        self.options
    }

    pub fn tokenize(&self, text: &str, mode: ParserMode) -> Vec<Token> {
        let text = match mode {
            ParserMode::Document => text.to_string(),
            ParserMode::Paste => demote_block_syntax(text),
        };
        let mut tokens = self.tokenize_blocks(&text);
        for transform in &self.transforms {
            tokens = transform.transform(tokens);
        }
        tokens
    }

    fn tokenize_blocks(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for segment in self.split_fences(text) {
            match segment {
                Segment::Markdown(source) => self.tokenize_markdown(&source, &mut tokens),
                Segment::Leaf { token, info, body } => {
                    tokens.push(Token::leaf(&token).with_info(&info).with_content(&body));
                }
                Segment::Container { token, info, body } => {
                    tokens.push(Token::open(&token).with_info(&info));
                    tokens.extend(self.tokenize_blocks(&body));
                    tokens.push(Token::close(&token).with_info(&info));
                }
            }
        }
        tokens
    }

    fn split_fences(&self, text: &str) -> Vec<Segment> {
        if self.fences.is_empty() {
            return vec![Segment::Markdown(text.to_string())];
        }
        let lines: Vec<&str> = text.lines().collect();
        let mut segments = Vec::new();
        let mut buffer: Vec<&str> = Vec::new();
        let mut code_fence: Option<(char, usize)> = None;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            if let Some((ch, len)) = code_fence {
                if closes_code_fence(line, ch, len) {
                    code_fence = None;
                }
                buffer.push(line);
                i += 1;
                continue;
            }
            if let Some(open) = opens_code_fence(line) {
                code_fence = Some(open);
                buffer.push(line);
                i += 1;
                continue;
            }

            let matched = self
                .fences
                .iter()
                .find_map(|rule| match_fence(rule, &lines, i).map(|end| (rule, end)));
            match matched {
                Some((rule, end)) => {
                    if !buffer.is_empty() {
                        segments.push(Segment::Markdown(buffer.join("\n")));
                        buffer.clear();
                    }
                    let info = line.trim()[rule.fence.len()..].trim().to_string();
                    let body = lines[i + 1..end].join("\n");
                    segments.push(match rule.kind {
                        FenceKind::Leaf => Segment::Leaf {
                            token: rule.token.clone(),
                            info,
                            body,
                        },
                        FenceKind::Container => Segment::Container {
                            token: rule.token.clone(),
                            info,
                            body,
                        },
                    });
                    i = end + 1;
                }
                None => {
                    buffer.push(line);
                    i += 1;
                }
            }
        }
        if !buffer.is_empty() {
            segments.push(Segment::Markdown(buffer.join("\n")));
        }
        segments
    }

    fn tokenize_markdown(&self, source: &str, tokens: &mut Vec<Token>) {
        let mut builder = EventFolder::new(tokens);
        if !self.may_nest_fences(source) {
            for event in Parser::new_ext(source, self.options) {
                builder.event(event);
            }
            builder.finish();
            return;
        }

        let mut events = Parser::new_ext(source, self.options).into_offset_iter();
        while let Some((event, range)) = events.next() {
            match event {
                Event::Start(Tag::BlockQuote(_)) if builder.stack.is_empty() => {
                    skip_container(&mut events);
                    let body = quote_body(line_span(source, range));
                    builder.splice("blockquote", Token::open("blockquote"), self.tokenize_blocks(&body));
                }
                Event::Start(Tag::Item) if builder.in_top_level_list() => {
                    skip_container(&mut events);
                    let (marker, body) = self.item_body(line_span(source, range));
                    let mut inner: Vec<Token> = marker.into_iter().collect();
                    inner.extend(self.tokenize_blocks(&body));
                    builder.splice("list_item", Token::open("list_item"), inner);
                }
                event => builder.event(event),
            }
        }
        builder.finish();
    }

    /// Top-level fences are already cut out, so any fence text left over
    /// may sit inside a container.
    fn may_nest_fences(&self, source: &str) -> bool {
        self.fences.iter().any(|rule| source.contains(rule.fence.as_str()))
    }

    /// Content of a list item with the marker and continuation indent
    /// removed. A leading task marker comes back as its own token so the
    /// item still reads as a checkbox.
    fn item_body(&self, source: &str) -> (Option<Token>, String) {
        let mut lines = source.lines();
        let first = lines.next().unwrap_or("");
        let indent = first.len() - first.trim_start_matches(' ').len();
        let rest = &first[indent..];
        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let marker = (if digits > 0 { digits + 1 } else { 1 }).min(rest.len());
        let after = &rest[marker..];
        let spaces = after.len() - after.trim_start_matches(' ').len();
        let (pad, mut content) = if after.trim().is_empty() {
            (1, "")
        } else if spaces > 4 {
            (1, &after[1..])
        } else {
            (spaces, &after[spaces..])
        };
        let width = indent + marker + pad;

        let mut task = None;
        if self.options.contains(GrammarOptions::ENABLE_TASKLISTS) {
            for (literal, checked) in [("[ ] ", false), ("[x] ", true), ("[X] ", true)] {
                if let Some(stripped) = content.strip_prefix(literal) {
                    task = Some(Token::leaf("task_marker").with_attr("checked", checked));
                    content = stripped;
                    break;
                }
            }
        }

        let mut body = vec![content.to_string()];
        for line in lines {
            let leading = line.len() - line.trim_start_matches(' ').len();
            body.push(line[leading.min(width)..].to_string());
        }
        (task, body.join("\n"))
    }
}

/// Consume events up to and including the end of the container whose start
/// was just read.
fn skip_container<'a, I>(events: &mut I)
where
    I: Iterator<Item = (Event<'a>, Range<usize>)>,
{
    let mut depth = 1usize;
    for (event, _) in events.by_ref() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
            _ => {}
        }
    }
}

/// `range` widened to the start of its first line, without trailing
/// newlines.
fn line_span(source: &str, range: Range<usize>) -> &str {
    let start = source[..range.start].rfind('\n').map_or(0, |pos| pos + 1);
    source[start..range.end].trim_end_matches('\n')
}

/// Block quote body with one level of `>` removed. Lazy continuation lines
/// are kept as they are.
fn quote_body(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start_matches(' ');
            match trimmed.strip_prefix('>') {
                Some(rest) if line.len() - trimmed.len() <= 3 => rest.strip_prefix(' ').unwrap_or(rest),
                _ => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn opens_code_fence(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn closes_code_fence(line: &str, ch: char, len: usize) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|&c| c == ch).count();
    run >= len && trimmed.chars().skip(run).all(char::is_whitespace)
}

/// Returns the index of the closing line when `lines[start]` opens `rule`.
fn match_fence(rule: &FenceRule, lines: &[&str], start: usize) -> Option<usize> {
    let line = lines[start];
    if line.starts_with(' ') || line.starts_with('\t') {
        return None;
    }
    let trimmed = line.trim_end();
    let rest = trimmed.strip_prefix(rule.fence.as_str())?;
    match rule.kind {
        // `$$` must stand alone on its line.
        FenceKind::Leaf if !rest.trim().is_empty() => return None,
        // Containers need a name (`:::info`), a bare fence only closes.
        FenceKind::Container if rest.trim().is_empty() || rest.starts_with(rule.fence.chars().next()?) => {
            return None
        }
        _ => {}
    }

    let mut depth = 0usize;
    for (offset, candidate) in lines[start + 1..].iter().enumerate() {
        let candidate = candidate.trim_end();
        if candidate == rule.fence {
            if depth == 0 {
                return Some(start + 1 + offset);
            }
            depth -= 1;
        } else if rule.kind == FenceKind::Container
            && candidate
                .strip_prefix(rule.fence.as_str())
                .is_some_and(|r| !r.trim().is_empty())
        {
            depth += 1;
        }
    }
    None
}

/// Escape line-leading block syntax so pasted text stays inline, leaving
/// fenced code untouched.
fn demote_block_syntax(text: &str) -> String {
    let mut out = Vec::new();
    let mut code_fence: Option<(char, usize)> = None;
    for line in text.lines() {
        if let Some((ch, len)) = code_fence {
            if closes_code_fence(line, ch, len) {
                code_fence = None;
            }
            out.push(line.to_string());
            continue;
        }
        if let Some(open) = opens_code_fence(line) {
            code_fence = Some(open);
            out.push(line.to_string());
            continue;
        }
        match PASTE_BLOCK_RE.captures(line) {
            Some(caps) => {
                let indent = caps.get(1).map_or("", |m| m.as_str());
                let rest = &line[indent.len()..];
                let escaped = match rest.find(['.', ')']) {
                    Some(pos) if rest.starts_with(|c: char| c.is_ascii_digit()) => {
                        format!("{}\\{}", &rest[..pos], &rest[pos..])
                    }
                    _ => format!("\\{rest}"),
                };
                out.push(format!("{indent}{escaped}"));
            }
            None => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Block(&'static str),
    ImplicitParagraph,
}

/// Converts pulldown-cmark events into tokens.
struct EventFolder<'t> {
    tokens: &'t mut Vec<Token>,
    stack: Vec<Frame>,
    alignments: Vec<Alignment>,
    in_table_head: bool,
    column: usize,
    code: Option<(String, String)>,
    html: Option<String>,
    image: Option<(Token, String)>,
}

impl<'t> EventFolder<'t> {
    fn new(tokens: &'t mut Vec<Token>) -> Self {
        Self {
            tokens,
            stack: Vec::new(),
            alignments: Vec::new(),
            in_table_head: false,
            column: 0,
            code: None,
            html: None,
            image: None,
        }
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Insert a container tokenized separately.
    fn splice(&mut self, name: &str, open: Token, inner: Vec<Token>) {
        self.close_implicit();
        self.push(open);
        self.tokens.extend(inner);
        self.push(Token::close(name));
    }

    fn in_top_level_list(&self) -> bool {
        matches!(
            self.stack.as_slice(),
            [Frame::Block("bullet_list" | "ordered_list")]
        )
    }

    fn open_block(&mut self, name: &'static str, token: Token) {
        self.close_implicit();
        self.push(token);
        self.stack.push(Frame::Block(name));
    }

    fn close_block(&mut self, name: &'static str) {
        self.close_implicit();
        if let Some(pos) = self.stack.iter().rposition(|f| *f == Frame::Block(name)) {
            self.stack.truncate(pos);
        }
        self.push(Token::close(name));
    }

    fn close_implicit(&mut self) {
        if self.stack.last() == Some(&Frame::ImplicitParagraph) {
            self.stack.pop();
            self.push(Token::close("paragraph"));
        }
    }

    /// Tight list items and table cells hold inline content directly; wrap
    /// it in a paragraph.
    fn ensure_inline_parent(&mut self) {
        if matches!(
            self.stack.last(),
            Some(Frame::Block("list_item" | "th" | "td")) | None
        ) {
            self.push(Token::open("paragraph"));
            self.stack.push(Frame::ImplicitParagraph);
        }
    }

    fn inline(&mut self, token: Token) {
        if let Some((_, alt)) = &mut self.image {
            if token.name == "text" || token.name == "code_inline" {
                alt.push_str(&token.content);
            }
            return;
        }
        self.ensure_inline_parent();
        self.push(token);
    }

    fn event(&mut self, event: Event<'_>) {
        if let Some((_, body)) = &mut self.code {
            match event {
                Event::Text(text) => body.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((info, body)) = self.code.take() {
                        let body = body.strip_suffix('\n').unwrap_or(&body).to_string();
                        self.close_implicit();
                        self.push(Token::leaf("code_block").with_info(&info).with_content(&body));
                    }
                }
                _ => {}
            }
            return;
        }
        if let Some(body) = &mut self.html {
            match event {
                Event::Html(html) | Event::Text(html) => body.push_str(&html),
                Event::End(TagEnd::HtmlBlock) => {
                    if let Some(body) = self.html.take() {
                        let body = body.trim_end();
                        if !body.is_empty() {
                            self.push(Token::open("paragraph"));
                            self.push(Token::text(body));
                            self.push(Token::close("paragraph"));
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.inline(Token::text(&text)),
            Event::Code(code) => self.inline(Token::leaf("code_inline").with_content(&code)),
            Event::InlineMath(math) | Event::DisplayMath(math) => {
                self.inline(Token::leaf("math_inline").with_content(&math))
            }
            Event::InlineHtml(html) | Event::Html(html) => {
                if BR_RE.is_match(html.trim()) {
                    self.inline(Token::leaf("hardbreak"));
                } else {
                    self.inline(Token::text(&html));
                }
            }
            Event::FootnoteReference(label) => self.inline(Token::text(&format!("[^{label}]"))),
            Event::SoftBreak => self.inline(Token::leaf("softbreak")),
            Event::HardBreak => self.inline(Token::leaf("hardbreak")),
            Event::Rule => {
                self.close_implicit();
                self.push(Token::leaf("hr"));
            }
            Event::TaskListMarker(checked) => {
                self.push(Token::leaf("task_marker").with_attr("checked", checked));
            }
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.open_block("paragraph", Token::open("paragraph")),
            Tag::Heading { level, .. } => self.open_block(
                "heading",
                Token::open("heading").with_attr("level", heading_level(level)),
            ),
            Tag::BlockQuote(_) => self.open_block("blockquote", Token::open("blockquote")),
            Tag::CodeBlock(kind) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.close_implicit();
                self.code = Some((info, String::new()));
            }
            Tag::HtmlBlock => {
                self.close_implicit();
                self.html = Some(String::new());
            }
            Tag::List(Some(start)) => self.open_block(
                "ordered_list",
                Token::open("ordered_list").with_attr("start", start),
            ),
            Tag::List(None) => self.open_block("bullet_list", Token::open("bullet_list")),
            Tag::Item => self.open_block("list_item", Token::open("list_item")),
            Tag::Table(alignments) => {
                self.alignments = alignments;
                self.open_block("table", Token::open("table"));
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.column = 0;
                self.open_block("tr", Token::open("tr"));
            }
            Tag::TableRow => {
                self.column = 0;
                self.open_block("tr", Token::open("tr"));
            }
            Tag::TableCell => {
                let name = if self.in_table_head { "th" } else { "td" };
                let alignment = match self.alignments.get(self.column) {
                    Some(Alignment::Left) => json!("left"),
                    Some(Alignment::Center) => json!("center"),
                    Some(Alignment::Right) => json!("right"),
                    _ => Value::Null,
                };
                self.open_block(name, Token::open(name).with_attr("alignment", alignment));
            }
            Tag::Emphasis => self.inline(Token::open("em")),
            Tag::Strong => self.inline(Token::open("strong")),
            Tag::Strikethrough => self.inline(Token::open("s")),
            Tag::Link {
                dest_url, title, ..
            } => self.inline(
                Token::open("link")
                    .with_attr("href", dest_url.to_string())
                    .with_attr("title", optional(&title)),
            ),
            Tag::Image {
                dest_url, title, ..
            } => {
                let token = Token::leaf("image")
                    .with_attr("src", dest_url.to_string())
                    .with_attr("title", optional(&title));
                self.image = Some((token, String::new()));
            }
            other => trace!(tag = ?other, "Ignoring unsupported markdown tag"),
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.close_block("paragraph"),
            TagEnd::Heading(_) => self.close_block("heading"),
            TagEnd::BlockQuote(_) => self.close_block("blockquote"),
            TagEnd::List(true) => self.close_block("ordered_list"),
            TagEnd::List(false) => self.close_block("bullet_list"),
            TagEnd::Item => self.close_block("list_item"),
            TagEnd::Table => {
                self.alignments.clear();
                self.close_block("table");
            }
            TagEnd::TableHead => {
                self.in_table_head = false;
                self.close_block("tr");
            }
            TagEnd::TableRow => self.close_block("tr"),
            TagEnd::TableCell => {
                let name = if self.in_table_head { "th" } else { "td" };
                self.close_block(name);
                self.column += 1;
            }
            TagEnd::Emphasis => self.inline(Token::close("em")),
            TagEnd::Strong => self.inline(Token::close("strong")),
            TagEnd::Strikethrough => self.inline(Token::close("s")),
            TagEnd::Link => self.inline(Token::close("link")),
            TagEnd::Image => {
                if let Some((token, alt)) = self.image.take() {
                    let alt = optional(&alt);
                    self.inline(token.with_attr("alt", alt));
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self) {
        self.close_implicit();
    }
}

fn heading_level(level: HeadingLevel) -> u64 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn optional(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> MarkdownTokenizer {
        let mut t = MarkdownTokenizer::new();
        t.enable(GrammarOptions::ENABLE_TABLES | GrammarOptions::ENABLE_TASKLISTS);
        t.add_fence(FenceRule {
            fence: "$$".into(),
            token: "math_block".into(),
            kind: FenceKind::Leaf,
        });
        t.add_fence(FenceRule {
            fence: ":::".into(),
            token: "container_notice".into(),
            kind: FenceKind::Container,
        });
        t
    }

    fn names(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t.nesting {
                Nesting::Open => format!("{}_open", t.name),
                Nesting::Close => format!("{}_close", t.name),
                Nesting::Leaf => t.name.clone(),
            })
            .collect()
    }

    #[test]
    fn tight_items_get_implicit_paragraphs() {
        let tokens = tokenizer().tokenize("- a\n- b", ParserMode::Document);
        assert_eq!(
            names(&tokens),
            vec![
                "bullet_list_open",
                "list_item_open",
                "paragraph_open",
                "text",
                "paragraph_close",
                "list_item_close",
                "list_item_open",
                "paragraph_open",
                "text",
                "paragraph_close",
                "list_item_close",
                "bullet_list_close",
            ]
        );
    }

    #[test]
    fn math_fence_is_cut_before_markdown() {
        let tokens = tokenizer().tokenize("before\n\n$$\nE=mc^2\n$$\n\nafter", ParserMode::Document);
        let math: Vec<&Token> = tokens.iter().filter(|t| t.name == "math_block").collect();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].content, "E=mc^2");
        assert_eq!(tokens.iter().filter(|t| t.name == "text").count(), 2);
    }

    #[test]
    fn fences_inside_code_are_left_alone() {
        let tokens = tokenizer().tokenize("```\n$$\nx\n$$\n```", ParserMode::Document);
        assert_eq!(names(&tokens), vec!["code_block"]);
        assert_eq!(tokens[0].content, "$$\nx\n$$");
    }

    #[test]
    fn containers_are_tokenized_recursively() {
        let tokens = tokenizer().tokenize(":::warning\n**careful**\n:::", ParserMode::Document);
        assert_eq!(tokens[0].name, "container_notice");
        assert_eq!(tokens[0].info, "warning");
        assert!(tokens.iter().any(|t| t.is("strong", Nesting::Open)));
        assert!(tokens.last().is_some_and(|t| t.is("container_notice", Nesting::Close)));
    }

    #[test]
    fn fences_inside_quotes_are_recognised() {
        let tokens = tokenizer().tokenize("> $$\n> x\n> $$", ParserMode::Document);
        assert_eq!(names(&tokens), vec!["blockquote_open", "math_block", "blockquote_close"]);
        assert_eq!(tokens[1].content, "x");
    }

    #[test]
    fn fences_inside_items_keep_task_markers() {
        let tokens = tokenizer().tokenize("- [x] done\n- $$\n  y\n  $$", ParserMode::Document);
        let names = names(&tokens);
        assert_eq!(names[..3], ["bullet_list_open", "list_item_open", "task_marker"]);
        assert_eq!(tokens[2].attrs.get("checked"), Some(&json!(true)));
        let math: Vec<&Token> = tokens.iter().filter(|t| t.name == "math_block").collect();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].content, "y");
        assert_eq!(names.iter().filter(|n| *n == "list_item_open").count(), 2);
        assert_eq!(names.last().map(String::as_str), Some("bullet_list_close"));
    }

    #[test]
    fn default_tokenizer_reads_plain_commonmark() {
        let tokens = MarkdownTokenizer::default().tokenize("# a\n\n$$\nx\n$$", ParserMode::Document);
        assert_eq!(tokens[0].name, "heading");
        assert!(tokens.iter().all(|t| t.name != "math_block"));
    }

    #[test]
    fn unclosed_fence_stays_text() {
        let tokens = tokenizer().tokenize("$$\nno end", ParserMode::Document);
        assert!(tokens.iter().all(|t| t.name != "math_block"));
    }

    #[test]
    fn table_cells_carry_alignment() {
        let tokens = tokenizer().tokenize("| a | b |\n|---|--:|\n| c | d |", ParserMode::Document);
        let cells: Vec<&Token> = tokens
            .iter()
            .filter(|t| (t.name == "th" || t.name == "td") && t.nesting == Nesting::Open)
            .collect();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[0].name, "th");
        assert_eq!(cells[1].attrs.get("alignment"), Some(&json!("right")));
        assert_eq!(cells[2].name, "td");
    }

    #[test]
    fn paste_mode_demotes_block_syntax() {
        assert_eq!(demote_block_syntax("# title"), "\\# title");
        assert_eq!(demote_block_syntax("- item"), "\\- item");
        assert_eq!(demote_block_syntax("2. second"), "2\\. second");
        assert_eq!(demote_block_syntax("> quote"), "\\> quote");
        assert_eq!(demote_block_syntax("plain *text*"), "plain *text*");
        assert_eq!(demote_block_syntax("```\n# code\n```"), "```\n# code\n```");

        let tokens = tokenizer().tokenize("# not a heading", ParserMode::Paste);
        assert!(tokens.iter().all(|t| t.name != "heading"));
    }
}
