//! Text search over textblocks.

use super::state::textblocks;
use super::transaction::Transaction;
use crate::error::EditorError;
use crate::model::{inline, Attrs, Node, LEAF_PLACEHOLDER};
use crate::schema::Schema;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: String,
    pub case_sensitive: bool,
    pub regex: bool,
    pub whole_word: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Read a query from command attributes. `None` when `query` is missing
    /// or empty.
    pub fn from_attrs(attrs: &Attrs) -> Option<Self> {
        let value = Value::Object(attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        let query: SearchQuery = serde_json::from_value(value).ok()?;
        (!query.query.is_empty()).then_some(query)
    }

    pub fn to_regex(&self) -> Option<Regex> {
        let source = if self.regex {
            self.query.clone()
        } else {
            regex::escape(&self.query)
        };
        let source = if self.whole_word {
            format!(r"\b(?:{source})\b")
        } else {
            source
        };
        RegexBuilder::new(&source)
            .case_insensitive(!self.case_sensitive)
            .build()
            .ok()
    }
}

/// One hit: an inline range inside the textblock at `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub path: Vec<usize>,
    pub from: usize,
    pub to: usize,
}

/// All non-empty matches of `query` in document order. Matches never span
/// textblocks or inline leaf nodes.
pub fn find_matches(doc: &Node, schema: &Schema, query: &SearchQuery) -> Vec<SearchMatch> {
    let Some(re) = query.to_regex() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for path in textblocks(doc, schema) {
        let Some(block) = doc.node_at(&path) else {
            continue;
        };
        let text = inline::flatten(block.content());
        for m in re.find_iter(&text) {
            if m.as_str().is_empty() || m.as_str().contains(LEAF_PLACEHOLDER) {
                continue;
            }
            let from = text[..m.start()].chars().count();
            let to = from + m.as_str().chars().count();
            out.push(SearchMatch {
                path: path.clone(),
                from,
                to,
            });
        }
    }
    out
}

/// Replace one match, keeping the marks of its first character.
pub fn replace_match(tr: &mut Transaction, hit: &SearchMatch, replacement: &str) -> Result<(), EditorError> {
    let block = tr
        .doc()
        .node_at(&hit.path)
        .ok_or_else(|| EditorError::InvalidPath(hit.path.clone()))?;
    let marks = inline::marks_at(block.content(), hit.from + 1);
    let content = if replacement.is_empty() {
        Vec::new()
    } else {
        vec![tr.schema().text(replacement, &marks)?]
    };
    tr.replace(hit.path.clone(), hit.from, hit.to, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodeSpec, SchemaBuilder};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .node("doc", NodeSpec::new().content("paragraph+"))
            .node("paragraph", NodeSpec::new().content("text*"))
            .node("text", NodeSpec::new().inline())
            .build()
            .unwrap()
    }

    fn doc(schema: &Schema, texts: &[&str]) -> Node {
        let paragraphs = texts
            .iter()
            .map(|t| {
                schema
                    .node("paragraph", Attrs::new(), vec![schema.text(*t, &[]).unwrap()])
                    .unwrap()
            })
            .collect();
        schema.node("doc", Attrs::new(), paragraphs).unwrap()
    }

    #[test]
    fn finds_case_insensitively_by_default() {
        let schema = schema();
        let doc = doc(&schema, &["Cat cat", "concat"]);
        let hits = find_matches(&doc, &schema, &SearchQuery::new("cat"));
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0], SearchMatch { path: vec![0], from: 0, to: 3 });
        assert_eq!(hits[2], SearchMatch { path: vec![1], from: 3, to: 6 });
    }

    #[test]
    fn whole_word_and_regex_options() {
        let schema = schema();
        let doc = doc(&schema, &["cat concat", "c4t"]);
        let whole = SearchQuery {
            whole_word: true,
            ..SearchQuery::new("cat")
        };
        assert_eq!(find_matches(&doc, &schema, &whole).len(), 1);
        let pattern = SearchQuery {
            regex: true,
            ..SearchQuery::new(r"c\dt")
        };
        assert_eq!(find_matches(&doc, &schema, &pattern)[0].path, vec![1]);
    }

    #[test]
    fn attrs_without_query_are_rejected() {
        let mut attrs = Attrs::new();
        assert_eq!(SearchQuery::from_attrs(&attrs), None);
        attrs.insert("query".into(), json!("x"));
        attrs.insert("case_sensitive".into(), json!(true));
        let query = SearchQuery::from_attrs(&attrs).unwrap();
        assert!(query.case_sensitive);
    }
}
