//! Markdown serializer state machine.

use super::{GrammarOptions, MarkToMarkdown, SerializerOptions};
use crate::error::SerializeError;
use crate::extension::ExtensionRegistry;
use crate::model::{Mark, Node};
use crate::schema::Schema;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

const HARD_BREAK: &str = "hard_break";
const LIST_GROUP: &str = "list";

static BLOCK_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([:#\-+>=])").expect("valid block start regex"));
static ORDERED_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([.)])").expect("valid ordered list regex"));

/// Serializes documents using the descriptors of one engine.
pub struct MarkdownSerializer<'a> {
    registry: &'a ExtensionRegistry,
    marks: &'a HashMap<String, MarkToMarkdown>,
    schema: &'a Schema,
    options: &'a SerializerOptions,
    grammar: GrammarOptions,
}

impl<'a> MarkdownSerializer<'a> {
    pub fn new(
        registry: &'a ExtensionRegistry,
        marks: &'a HashMap<String, MarkToMarkdown>,
        schema: &'a Schema,
        options: &'a SerializerOptions,
    ) -> Self {
        Self {
            registry,
            marks,
            schema,
            options,
            grammar: GrammarOptions::empty(),
        }
    }

    /// Grammar extensions the output will be parsed back with. Text that
    /// one of them would pick up as syntax is escaped.
    pub fn with_grammar(mut self, grammar: GrammarOptions) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn serialize(&self, doc: &Node) -> Result<String, SerializeError> {
        let mut state = MarkdownSerializerState::new(self.registry, self.marks, self.schema, self.options)
            .with_grammar(self.grammar);
        state.render_content(doc)?;
        Ok(state.out)
    }
}

/// Output buffer plus the block bookkeeping needed while rendering.
pub struct MarkdownSerializerState<'a> {
    registry: &'a ExtensionRegistry,
    marks: &'a HashMap<String, MarkToMarkdown>,
    schema: &'a Schema,
    options: &'a SerializerOptions,
    out: String,
    delim: String,
    closed: Option<String>,
    /// Marker of the list that closed last, while no other block has.
    list_marker: Option<String>,
    escape_dollar: bool,
    in_tight_list: bool,
    in_table: bool,
    at_block_start: bool,
}

impl<'a> MarkdownSerializerState<'a> {
    pub fn new(
        registry: &'a ExtensionRegistry,
        marks: &'a HashMap<String, MarkToMarkdown>,
        schema: &'a Schema,
        options: &'a SerializerOptions,
    ) -> Self {
        Self {
            registry,
            marks,
            schema,
            options,
            out: String::new(),
            delim: String::new(),
            closed: None,
            list_marker: None,
            escape_dollar: false,
            in_tight_list: false,
            in_table: false,
            at_block_start: false,
        }
    }

    pub fn with_grammar(mut self, grammar: GrammarOptions) -> Self {
        self.escape_dollar = grammar.contains(GrammarOptions::ENABLE_MATH);
        self
    }

    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn options(&self) -> &SerializerOptions {
        self.options
    }

    pub fn in_table(&self) -> bool {
        self.in_table
    }

    /// Append raw text without delimiter handling.
    pub fn push_raw(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// Emit the separator owed by the last closed block: a newline plus
    /// `size - 1` (possibly prefixed) blank lines.
    pub fn flush_close(&mut self, size: usize) {
        if self.closed.is_some() {
            if !self.at_blank() {
                self.out.push('\n');
            }
            if size > 1 {
                let delim_min = self.delim.trim_end().to_string();
                for _ in 1..size {
                    self.out.push_str(&delim_min);
                    self.out.push('\n');
                }
            }
            self.closed = None;
        }
    }

    pub fn at_blank(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    pub fn ensure_new_line(&mut self) {
        if !self.at_blank() {
            self.out.push('\n');
        }
    }

    /// Flush pending block separators, write the current line prefix if at
    /// the start of a line, then `content`.
    pub fn write(&mut self, content: &str) {
        self.flush_close(2);
        if !self.delim.is_empty() && self.at_blank() {
            let delim = self.delim.clone();
            self.out.push_str(&delim);
        }
        self.out.push_str(content);
    }

    pub fn close_block(&mut self, node: &Node) {
        self.closed = Some(node.node_type().to_string());
        self.list_marker = None;
    }

    /// Marker for the list about to be rendered. Lists sharing a marker
    /// with the list right before them would parse back as one list, so
    /// those take the first alternative that differs.
    pub fn list_marker<'m>(&self, preferred: &'m str, alternatives: &[&'m str]) -> &'m str {
        let previous = if self.closed.is_some() {
            self.list_marker.as_deref()
        } else {
            None
        };
        if previous != Some(preferred) {
            return preferred;
        }
        alternatives
            .iter()
            .copied()
            .find(|m| Some(*m) != previous)
            .unwrap_or(preferred)
    }

    /// Render a block whose lines are all prefixed with `delim`; the first
    /// line uses `first_delim` when given.
    pub fn wrap_block<F>(
        &mut self,
        delim: &str,
        first_delim: Option<&str>,
        node: &Node,
        f: F,
    ) -> Result<(), SerializeError>
    where
        F: FnOnce(&mut Self) -> Result<(), SerializeError>,
    {
        let old = self.delim.clone();
        self.write(first_delim.unwrap_or(delim));
        self.delim.push_str(delim);
        let result = f(self);
        self.delim = old;
        self.close_block(node);
        result
    }

    /// Write text line by line, escaping Markdown syntax when `escape` is set.
    pub fn text(&mut self, text: &str, escape: bool) {
        let text = if self.in_table {
            text.replace('\n', " ")
        } else {
            text.to_string()
        };
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            let start_of_line =
                (i == 0 && self.at_block_start) || self.at_blank() || self.closed.is_some();
            self.write("");
            if !escape && line.starts_with('[') && ends_with_unescaped_bang(&self.out) {
                self.out.pop();
                self.out.push_str("\\!");
            }
            if escape {
                let escaped = self.esc(line, start_of_line);
                self.out.push_str(&escaped);
            } else {
                self.out.push_str(line);
            }
            if i != last {
                self.out.push('\n');
            }
        }
    }

    /// Escape Markdown syntax characters in `text`.
    pub fn esc(&self, text: &str, start_of_line: bool) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len() + 8);
        for (i, &c) in chars.iter().enumerate() {
            match c {
                '`' | '*' | '\\' | '~' | '[' | ']' => {
                    out.push('\\');
                    out.push(c);
                }
                '_' => {
                    let word = |ch: Option<&char>| ch.is_some_and(|ch| ch.is_alphanumeric());
                    let intraword = i > 0 && word(chars.get(i - 1)) && word(chars.get(i + 1));
                    if !intraword {
                        out.push('\\');
                    }
                    out.push(c);
                }
                '|' if self.in_table => out.push_str("\\|"),
                '$' if self.escape_dollar => out.push_str("\\$"),
                _ => out.push(c),
            }
        }
        if start_of_line {
            out = BLOCK_START_RE.replace(&out, "\\$1").into_owned();
            out = ORDERED_START_RE.replace(&out, "$1\\$2").into_owned();
        }
        out
    }

    /// Render a node through its descriptor.
    pub fn render(&mut self, node: &Node, parent: &Node, index: usize) -> Result<(), SerializeError> {
        let registry = self.registry;
        let extension = registry
            .get(node.node_type())
            .ok_or_else(|| SerializeError::UnknownNodeType(node.node_type().to_string()))?;
        extension.to_markdown(self, node, parent, index)
    }

    pub fn render_content(&mut self, parent: &Node) -> Result<(), SerializeError> {
        for (i, child) in parent.content().iter().enumerate() {
            self.render(child, parent, i)?;
        }
        Ok(())
    }

    fn mark_info(&self, mark: &Mark) -> Option<&'a MarkToMarkdown> {
        let marks = self.marks;
        marks.get(mark.mark_type())
    }

    fn is_mixable(&self, mark: &Mark) -> bool {
        self.mark_info(mark).is_some_and(|m| m.mixable)
    }

    fn expels_whitespace(&self, mark: &Mark) -> bool {
        self.mark_info(mark)
            .is_some_and(|m| m.expel_enclosing_whitespace)
    }

    fn mark_string(
        &self,
        mark: &Mark,
        open: bool,
        parent: &Node,
        index: usize,
    ) -> Result<String, SerializeError> {
        let info = self
            .mark_info(mark)
            .ok_or_else(|| SerializeError::UnknownMarkType(mark.mark_type().to_string()))?;
        let delimiter = if open { &info.open } else { &info.close };
        Ok(delimiter.render(mark, parent, index))
    }

    pub fn render_inline(&mut self, parent: &Node) -> Result<(), SerializeError> {
        self.render_inline_from(parent, true)
    }

    /// Render the inline content of `parent`, opening and closing marks as
    /// the active set changes between runs.
    pub fn render_inline_from(
        &mut self,
        parent: &Node,
        from_block_start: bool,
    ) -> Result<(), SerializeError> {
        self.at_block_start = from_block_start;
        let count = parent.child_count();
        let mut active: Vec<Mark> = Vec::new();
        let mut trailing = String::new();

        for index in 0..=count {
            let mut node: Option<Node> = parent.child(index).cloned();
            let mut marks: Vec<Mark> = node.as_ref().map(|n| n.marks().to_vec()).unwrap_or_default();

            // A mark ending right after a hard break would leave a dangling
            // delimiter at the end of the line.
            if node.as_ref().is_some_and(|n| n.node_type() == HARD_BREAK) {
                let next = parent.child(index + 1);
                marks.retain(|m| match next {
                    None => false,
                    Some(next) => {
                        m.is_in_set(next.marks())
                            && (!next.is_text()
                                || next.text().is_some_and(|t| t.chars().any(|c| !c.is_whitespace())))
                    }
                });
            }

            let mut leading = std::mem::take(&mut trailing);

            if let Some(text) = node.as_ref().and_then(|n| n.text().map(str::to_string)) {
                let expel = marks
                    .iter()
                    .any(|m| self.expels_whitespace(m) && !m.is_in_set(&active));
                if expel {
                    let rest = text.trim_start();
                    let lead = &text[..text.len() - rest.len()];
                    if !lead.is_empty() {
                        leading.push_str(lead);
                        node = if rest.is_empty() {
                            None
                        } else {
                            node.map(|n| n.with_text(rest.to_string()))
                        };
                        if node.is_none() {
                            marks = active.clone();
                        }
                    }
                }
            }

            if let Some(text) = node.as_ref().and_then(|n| n.text().map(str::to_string)) {
                let next = parent.child(index + 1);
                let expel = marks.iter().any(|m| {
                    self.expels_whitespace(m)
                        && next.map_or(true, |next| !m.is_in_set(next.marks()))
                });
                if expel {
                    let rest = text.trim_end();
                    let trail = &text[rest.len()..];
                    if !trail.is_empty() {
                        trailing = trail.to_string();
                        node = if rest.is_empty() {
                            None
                        } else {
                            node.map(|n| n.with_text(rest.to_string()))
                        };
                        if node.is_none() {
                            marks = active.clone();
                        }
                    }
                }
            }

            let inner = marks.last().cloned();
            let no_esc = inner
                .as_ref()
                .and_then(|m| self.mark_info(m))
                .is_some_and(|info| !info.escape);
            let len = marks.len() - usize::from(no_esc);

            // Rotate mixable marks so their order matches `active`.
            'outer: for i in 0..len {
                let mark = marks[i].clone();
                if !self.is_mixable(&mark) {
                    break;
                }
                for j in 0..active.len() {
                    let other = &active[j];
                    if !self.is_mixable(other) {
                        break;
                    }
                    if &mark == other {
                        if i > j {
                            let mut reordered = marks[..j].to_vec();
                            reordered.push(mark.clone());
                            reordered.extend_from_slice(&marks[j..i]);
                            reordered.extend_from_slice(&marks[i + 1..]);
                            marks = reordered;
                        } else if j > i {
                            let j = j.min(len - 1);
                            let mut reordered = marks[..i].to_vec();
                            reordered.extend_from_slice(&marks[i + 1..=j]);
                            reordered.push(mark.clone());
                            reordered.extend_from_slice(&marks[j + 1..]);
                            marks = reordered;
                        }
                        continue 'outer;
                    }
                }
            }

            let mut keep = 0;
            while keep < active.len().min(len) && marks[keep] == active[keep] {
                keep += 1;
            }

            while keep < active.len() {
                if let Some(mark) = active.pop() {
                    let close = self.mark_string(&mark, false, parent, index)?;
                    self.text(&close, false);
                }
            }

            if !leading.is_empty() {
                self.text(&leading, true);
            }

            if let Some(node) = &node {
                while active.len() < len {
                    let add = marks[active.len()].clone();
                    let open = self.mark_string(&add, true, parent, index)?;
                    active.push(add);
                    self.text(&open, false);
                    self.at_block_start = false;
                }

                match (&inner, node.text()) {
                    (Some(inner), Some(text)) if no_esc => {
                        let open = self.mark_string(inner, true, parent, index)?;
                        let close = self.mark_string(inner, false, parent, index + 1)?;
                        let body = if self.in_table {
                            text.replace('|', "\\|")
                        } else {
                            text.to_string()
                        };
                        self.text(&format!("{open}{body}{close}"), false);
                    }
                    _ => self.render(node, parent, index)?,
                }
                self.at_block_start = false;
            }
        }
        self.at_block_start = false;
        Ok(())
    }

    fn is_list(&self, node: &Node) -> bool {
        self.schema
            .node_type(node.node_type())
            .is_some_and(|t| t.groups().iter().any(|g| g == LIST_GROUP))
    }

    /// A list is tight when none of its items holds more than one
    /// non-list block.
    pub fn is_tight_list(&self, list: &Node) -> bool {
        list.content().iter().all(|item| {
            item.content()
                .iter()
                .filter(|child| !self.is_list(child))
                .count()
                <= 1
        })
    }

    /// Render list items, each prefixed by `first_delim(index)` and
    /// continued with `delim`. `marker` is what [`list_marker`] chose.
    ///
    /// [`list_marker`]: Self::list_marker
    pub fn render_list<F>(
        &mut self,
        node: &Node,
        marker: &str,
        delim: &str,
        first_delim: F,
    ) -> Result<(), SerializeError>
    where
        F: Fn(usize) -> String,
    {
        if self.closed.as_deref() == Some(node.node_type()) {
            self.flush_close(3);
        } else if self.in_tight_list {
            self.flush_close(1);
        }

        let is_tight = self.is_tight_list(node);
        let prev_tight = self.in_tight_list;
        self.in_tight_list = is_tight;
        for (i, child) in node.content().iter().enumerate() {
            if i > 0 && is_tight {
                self.flush_close(1);
            }
            let first = first_delim(i);
            self.wrap_block(delim, Some(first.as_str()), node, |state| state.render(child, node, i))?;
        }
        self.in_tight_list = prev_tight;
        self.list_marker = Some(marker.to_string());
        Ok(())
    }

    /// Render a table as a pipe table with a header separator after the
    /// first row.
    pub fn render_table(&mut self, node: &Node) -> Result<(), SerializeError> {
        let prev_table = self.in_table;
        self.in_table = true;
        for (i, row) in node.content().iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            self.write("");
            let mut separator = String::new();
            for (j, cell) in row.content().iter().enumerate() {
                self.out.push_str(if j == 0 { "| " } else { " | " });
                for (k, block) in cell.content().iter().enumerate() {
                    if block.child_count() == 0 {
                        self.out.push_str("  ");
                    } else {
                        if k > 0 {
                            self.out.push(' ');
                        }
                        self.closed = None;
                        self.render_inline(block)?;
                    }
                }
                if cell.child_count() == 0 {
                    self.out.push_str("  ");
                }
                self.closed = None;
                if i == 0 {
                    separator.push_str(match cell.attr_str("alignment") {
                        Some("center") => "|:---:",
                        Some("left") => "|:---",
                        Some("right") => "|---:",
                        _ => "|----",
                    });
                }
            }
            self.out.push_str(" |");
            if i == 0 {
                self.out.push('\n');
                self.write(&separator);
                self.out.push('|');
            }
        }
        self.in_table = prev_table;
        self.close_block(node);
        Ok(())
    }
}

fn ends_with_unescaped_bang(out: &str) -> bool {
    let mut chars = out.chars().rev();
    matches!(chars.next(), Some('!')) && chars.next() != Some('\\')
}

/// Shortest backtick run that can wrap `text` as inline code: one longer
/// than the longest run inside it, padded with a space when needed.
pub fn backticks_for(text: &str, closing: bool) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    let ticks = "`".repeat(longest + 1);
    match (longest > 0, closing) {
        (true, true) => format!(" {ticks}"),
        (true, false) => format!("{ticks} "),
        _ => ticks,
    }
}

/// Fence that cannot collide with any backtick run in `text`.
pub fn code_fence_for(text: &str) -> String {
    let mut longest = 0;
    for line in text.lines() {
        let run = line.trim_start().chars().take_while(|&c| c == '`').count();
        longest = longest.max(run);
    }
    if longest >= 3 {
        "`".repeat(longest + 1)
    } else {
        "```".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backticks_grow_past_inner_runs() {
        assert_eq!(backticks_for("x", false), "`");
        assert_eq!(backticks_for("a ` b", false), "`` ");
        assert_eq!(backticks_for("a ` b", true), " ``");
        assert_eq!(code_fence_for("plain"), "```");
        assert_eq!(code_fence_for("```\ninner\n```"), "````");
    }

    #[test]
    fn bang_detection_respects_escapes() {
        assert!(ends_with_unescaped_bang("wow!"));
        assert!(!ends_with_unescaped_bang("wow\\!"));
        assert!(!ends_with_unescaped_bang("wow"));
    }
}
