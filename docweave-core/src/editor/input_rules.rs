//! Input rules: patterns matched against the text before the cursor as the
//! user types.

use super::state::EditorState;
use super::transaction::Transaction;
use crate::model::{inline, Attrs};
use regex::{Captures, Regex};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace};

/// A successful match of an input rule.
///
/// The haystack is the block text before the cursor followed by the typed
/// text, which is not yet part of the document.
pub struct InputMatch<'t> {
    pub captures: Captures<'t>,
    haystack: &'t str,
    /// Inline offset of the cursor; the end of the matched document range.
    cursor: usize,
}

impl<'t> InputMatch<'t> {
    fn offset_of(&self, byte: usize) -> usize {
        self.haystack[..byte].chars().count().min(self.cursor)
    }

    /// Document range covered by the whole match.
    pub fn range(&self) -> Range<usize> {
        let start = self.captures.get(0).map(|m| m.start()).unwrap_or(0);
        self.offset_of(start)..self.cursor
    }

    /// Document range covered by a capture group, clamped to the cursor.
    pub fn group_range(&self, index: usize) -> Option<Range<usize>> {
        let m = self.captures.get(index)?;
        Some(self.offset_of(m.start())..self.offset_of(m.end()))
    }

    /// Document range covered by a named group, clamped to the cursor.
    pub fn named_range(&self, name: &str) -> Option<Range<usize>> {
        let m = self.captures.name(name)?;
        Some(self.offset_of(m.start())..self.offset_of(m.end()))
    }

    pub fn group(&self, name: &str) -> Option<&'t str> {
        self.captures.name(name).map(|m| m.as_str())
    }

    pub fn full(&self) -> &'t str {
        self.captures.get(0).map(|m| m.as_str()).unwrap_or("")
    }
}

pub type InputRuleHandler = Arc<dyn Fn(&EditorState, &InputMatch<'_>) -> Option<Transaction> + Send + Sync>;

#[derive(Clone)]
pub struct InputRule {
    pub pattern: Regex,
    pub handler: InputRuleHandler,
}

impl InputRule {
    pub fn new<F>(pattern: &Regex, handler: F) -> Self
    where
        F: Fn(&EditorState, &InputMatch<'_>) -> Option<Transaction> + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.clone(),
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for InputRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRule")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Input rules in registration order. Registering a pattern again replaces
/// the earlier rule in place.
#[derive(Debug, Clone, Default)]
pub struct InputRuleTable {
    rules: Vec<InputRule>,
}

impl InputRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: InputRule) {
        match self
            .rules
            .iter_mut()
            .find(|r| r.pattern.as_str() == rule.pattern.as_str())
        {
            Some(existing) => {
                debug!(pattern = rule.pattern.as_str(), "Input rule overridden by later registration");
                *existing = rule;
            }
            None => self.rules.push(rule),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.pattern.as_str())
    }

    /// Try the rules against typing `text` at the cursor. Rules never fire
    /// on read-only states, inside code, or across a block selection.
    pub fn handle(&self, state: &EditorState, text: &str) -> Option<Transaction> {
        if !state.is_editable() || state.in_code() || !state.selection().is_in_one_block() {
            return None;
        }
        let from = state.selection().from();
        let block = state.doc().node_at(&from.path)?;
        let before = inline::flatten(&inline::slice(block.content(), 0, from.offset));
        let haystack = format!("{before}{text}");

        for rule in &self.rules {
            let Some(captures) = rule.pattern.captures(&haystack) else {
                continue;
            };
            let m = InputMatch {
                captures,
                haystack: &haystack,
                cursor: from.offset,
            };
            if let Some(tr) = (rule.handler)(state, &m) {
                trace!(pattern = rule.pattern.as_str(), "Input rule applied");
                return Some(tr);
            }
        }
        None
    }
}

/// Turn the textblock into `node_type` when the pattern matches at its
/// start, removing the matched text. `attrs` returning `None` declines the
/// match.
pub fn textblock_type_rule<F>(pattern: &Regex, node_type: &'static str, attrs: F) -> InputRule
where
    F: Fn(&InputMatch<'_>) -> Option<Attrs> + Send + Sync + 'static,
{
    InputRule::new(pattern, move |state, m| {
        let range = m.range();
        if range.start != 0 {
            return None;
        }
        let attrs = attrs(m)?;
        let path = state.selection().head.path.clone();
        let block = state.doc().node_at(&path)?;
        if block.node_type() == node_type && block.attrs() == &attrs {
            return None;
        }
        let mut tr = state.tr();
        tr.replace(path.clone(), range.start, range.end, Vec::new()).ok()?;
        tr.set_block_type(&path, node_type, attrs).ok()?;
        Some(tr)
    })
}

/// Wrap the textblock in `wrapper` (through `item`, for lists) when the
/// pattern matches at its start.
pub fn wrapping_rule<F>(pattern: &Regex, wrapper: &'static str, item: Option<&'static str>, attrs: F) -> InputRule
where
    F: Fn(&InputMatch<'_>) -> Option<Attrs> + Send + Sync + 'static,
{
    InputRule::new(pattern, move |state, m| {
        let range = m.range();
        if range.start != 0 {
            return None;
        }
        let attrs = attrs(m)?;
        let path = state.selection().head.path.clone();
        let mut tr = state.tr();
        tr.replace(path.clone(), range.start, range.end, Vec::new()).ok()?;
        tr.wrap_block(&path, wrapper, attrs, item).ok()?;
        Some(tr)
    })
}

/// Replace the match (or its `full` group) with the `text` group carrying
/// `mark_type`. The mark is not continued for text typed afterwards.
pub fn mark_rule(pattern: &Regex, mark_type: &'static str, attrs: fn(&InputMatch<'_>) -> Attrs) -> InputRule {
    InputRule::new(pattern, move |state, m| {
        let inner = m.group("text")?;
        if inner.is_empty() {
            return None;
        }
        let schema = state.schema();
        let block = state.head_block()?;
        if !schema.node_type(block.node_type())?.allows_mark(mark_type) {
            return None;
        }
        let range = match m.named_range("full") {
            Some(full) => full.start..m.range().end,
            None => m.range(),
        };
        let path = state.selection().head.path.clone();
        let base = inline::marks_at(block.content(), range.start);
        let mark = schema.mark(mark_type, attrs(m)).ok()?;
        let marks = schema.add_mark(&base, mark);
        let node = schema.text(inner, &marks).ok()?;
        let mut tr = state.tr();
        tr.replace(path, range.start, range.end, vec![node]).ok()?;
        tr.set_stored_marks(Some(schema.remove_mark(&marks, mark_type)));
        Some(tr)
    })
}

/// Replace the match (or its first capture group, when the pattern has
/// one) with `replacement`.
pub fn text_rule(pattern: &Regex, replacement: &'static str) -> InputRule {
    InputRule::new(pattern, move |state, m| {
        let range = m.group_range(1).unwrap_or_else(|| m.range());
        let range = range.start..m.range().end;
        let path = state.selection().head.path.clone();
        let marks = state.marks_at_cursor();
        let node = state.schema().text(replacement, &marks).ok()?;
        let mut tr = state.tr();
        tr.replace(path, range.start, range.end, vec![node]).ok()?;
        Some(tr)
    })
}

pub fn no_attrs(_: &InputMatch<'_>) -> Attrs {
    Attrs::new()
}

pub fn always_attrs(_: &InputMatch<'_>) -> Option<Attrs> {
    Some(Attrs::new())
}
