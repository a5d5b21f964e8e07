//! Find and replace.
//!
//! `find` and `clear_search` only publish the active query through the
//! `search` transaction meta; the [`FindState`] plugin keeps the matches
//! for the current document.

use super::commands::attr_string;
use crate::editor::search::{find_matches, replace_match, SearchMatch, SearchQuery};
use crate::editor::{command_fn, emit, Command, CommandFn, EditorState, Plugin, Position, Selection, Transaction};
use crate::extension::Extension;
use serde_json::Value;
use std::any::Any;
use tracing::debug;

pub const FIND_PLUGIN_KEY: &str = "find_and_replace";
const SEARCH_META: &str = "search";

fn hit_selection(hit: &SearchMatch) -> Selection {
    Selection::new(
        Position::new(hit.path.clone(), hit.from),
        Position::new(hit.path.clone(), hit.to),
    )
}

/// First match starting at or after `from`, wrapping to the first match
/// in the document.
fn next_match<'m>(matches: &'m [SearchMatch], from: &Position) -> Option<&'m SearchMatch> {
    matches
        .iter()
        .find(|hit| Position::new(hit.path.clone(), hit.from) >= *from)
        .or_else(|| matches.first())
}

fn find() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let Some(query) = SearchQuery::from_attrs(attrs) else {
            return false;
        };
        if query.to_regex().is_none() {
            return false;
        }
        let matches = find_matches(state.doc(), state.schema(), &query);
        let mut tr = state.tr();
        tr.set_meta(SEARCH_META, serde_json::to_value(&query).unwrap_or(Value::Null));
        if let Some(hit) = next_match(&matches, state.selection().from()) {
            tr.set_selection(hit_selection(hit));
        }
        emit(dispatch, tr)
    })
}

fn clear_search() -> CommandFn {
    command_fn(|state, _, dispatch| {
        let mut tr = state.tr();
        tr.set_meta(SEARCH_META, Value::Null);
        emit(dispatch, tr)
    })
}

fn replace() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let (Some(query), Some(replacement)) = (SearchQuery::from_attrs(attrs), attr_string(attrs, "replacement"))
        else {
            return false;
        };
        let matches = find_matches(state.doc(), state.schema(), &query);
        let Some(hit) = next_match(&matches, state.selection().from()) else {
            return false;
        };
        let mut tr = state.tr();
        if let Err(err) = replace_match(&mut tr, hit, &replacement) {
            debug!(%err, "Replacement rejected");
            return false;
        }
        let end = hit.from + replacement.chars().count();
        tr.set_selection(Selection::cursor(Position::new(hit.path.clone(), end)));
        emit(dispatch, tr)
    })
}

fn replace_all() -> CommandFn {
    command_fn(|state, attrs, dispatch| {
        let (Some(query), Some(replacement)) = (SearchQuery::from_attrs(attrs), attr_string(attrs, "replacement"))
        else {
            return false;
        };
        let matches = find_matches(state.doc(), state.schema(), &query);
        if matches.is_empty() {
            return false;
        }
        let mut tr = state.tr();
        // Back to front, so earlier offsets in a block stay valid.
        for hit in matches.iter().rev() {
            if let Err(err) = replace_match(&mut tr, hit, &replacement) {
                debug!(%err, "Replacement rejected");
                return false;
            }
        }
        debug!(count = matches.len(), "Replaced all matches");
        emit(dispatch, tr)
    })
}

pub struct FindAndReplace;

impl Extension for FindAndReplace {
    fn name(&self) -> &str {
        "find_and_replace"
    }

    fn commands(&self) -> Vec<Command> {
        vec![
            Command::new("find", find()).read_only(),
            Command::new("clear_search", clear_search()).read_only(),
            Command::new("replace", replace()),
            Command::new("replace_all", replace_all()),
        ]
    }

    fn plugins(&self) -> Vec<Box<dyn Plugin>> {
        vec![Box::new(FindState::default())]
    }
}

/// Active query and its matches in the current document.
#[derive(Debug, Default)]
pub struct FindState {
    query: Option<SearchQuery>,
    matches: Vec<SearchMatch>,
}

impl FindState {
    pub fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    fn recompute(&mut self, state: &EditorState) {
        self.matches = match &self.query {
            Some(query) => find_matches(state.doc(), state.schema(), query),
            None => Vec::new(),
        };
    }
}

impl Plugin for FindState {
    fn key(&self) -> &str {
        FIND_PLUGIN_KEY
    }

    fn apply(&mut self, tr: &Transaction, _old: &EditorState, new: &EditorState) -> Option<Transaction> {
        let query_changed = match tr.meta(SEARCH_META) {
            Some(value) => {
                self.query = serde_json::from_value::<SearchQuery>(value.clone())
                    .ok()
                    .filter(|q| !q.query.is_empty());
                true
            }
            None => false,
        };
        if query_changed || (tr.doc_changed() && self.query.is_some()) {
            self.recompute(new);
        }
        None
    }

    fn destroy(&mut self) {
        self.query = None;
        self.matches.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
