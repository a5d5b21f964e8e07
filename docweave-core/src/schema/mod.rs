//! Schema assembly and validated node construction.

mod spec;

pub use spec::{AttributeSpec, MarkSpec, NodeSpec};

use crate::error::SchemaError;
use crate::extension::Extension;
use crate::model::{Attrs, ContentExpr, Mark, Node};
use crate::model::content::ContentExprError;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

pub const TOP_NODE: &str = "doc";
pub const TEXT_NODE: &str = "text";

#[derive(Debug, Clone)]
pub struct NodeType {
    name: String,
    spec: NodeSpec,
    groups: Vec<String>,
    content: ContentExpr,
    /// `None` allows every mark.
    allowed_marks: Option<BTreeSet<String>>,
    textblock: bool,
}

impl NodeType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn content_expr(&self) -> &ContentExpr {
        &self.content
    }

    pub fn is_inline(&self) -> bool {
        self.spec.inline
    }

    pub fn is_block(&self) -> bool {
        !self.spec.inline
    }

    pub fn is_textblock(&self) -> bool {
        self.textblock
    }

    pub fn is_leaf(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_atom(&self) -> bool {
        self.spec.atom || self.is_leaf()
    }

    pub fn is_code(&self) -> bool {
        self.spec.code
    }

    pub fn allows_mark(&self, mark: &str) -> bool {
        match &self.allowed_marks {
            None => true,
            Some(set) => set.contains(mark),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkType {
    name: String,
    spec: MarkSpec,
    rank: usize,
    excludes: BTreeSet<String>,
}

impl MarkType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &MarkSpec {
        &self.spec
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn excludes(&self, other: &str) -> bool {
        self.excludes.contains(other)
    }
}

/// Collects node and mark declarations in registration order.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    nodes: Vec<(String, NodeSpec)>,
    marks: Vec<(String, MarkSpec)>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, name: impl Into<String>, spec: NodeSpec) -> Self {
        self.nodes.push((name.into(), spec));
        self
    }

    pub fn mark(mut self, name: impl Into<String>, spec: MarkSpec) -> Self {
        self.marks.push((name.into(), spec));
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut node_index = HashMap::new();
        for (i, (name, _)) in self.nodes.iter().enumerate() {
            if node_index.insert(name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateType(name.clone()));
            }
        }
        let mut mark_index = HashMap::new();
        for (i, (name, _)) in self.marks.iter().enumerate() {
            if node_index.contains_key(name) || mark_index.insert(name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateType(name.clone()));
            }
        }
        if !node_index.contains_key(TOP_NODE) {
            return Err(SchemaError::MissingTopNode(TOP_NODE.to_string()));
        }
        if !node_index.contains_key(TEXT_NODE) {
            return Err(SchemaError::MissingTextNode);
        }

        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for (name, spec) in &self.nodes {
            for group in spec.groups() {
                groups.entry(group.to_string()).or_default().push(name.clone());
            }
        }

        let resolve = |token: &str| -> Option<Vec<String>> {
            if node_index.contains_key(token) {
                Some(vec![token.to_string()])
            } else {
                groups.get(token).cloned()
            }
        };

        let mark_names: Vec<String> = self.marks.iter().map(|(n, _)| n.clone()).collect();
        let filter_marks = |owner: &str, list: &str| -> BTreeSet<String> {
            list.split_whitespace()
                .filter(|name| {
                    let known = mark_names.iter().any(|m| m == name);
                    if !known {
                        debug!(owner, mark = *name, "Dropping unregistered mark name");
                    }
                    known
                })
                .map(str::to_string)
                .collect()
        };

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (name, spec) in &self.nodes {
            let content = match &spec.content {
                Some(expr) => ContentExpr::parse(expr, resolve).map_err(|e| match e {
                    ContentExprError::Unknown(token) => SchemaError::UnknownContentReference {
                        node: name.clone(),
                        token,
                    },
                    ContentExprError::Syntax(message) => SchemaError::InvalidContentExpression {
                        node: name.clone(),
                        message,
                    },
                })?,
                None => ContentExpr::default(),
            };
            nodes.push(NodeType {
                name: name.clone(),
                spec: spec.clone(),
                groups: spec.groups().map(str::to_string).collect(),
                content,
                allowed_marks: None,
                textblock: false,
            });
        }

        // Second pass once every type's inline flag is known.
        let inline: HashMap<String, bool> = nodes
            .iter()
            .map(|n| (n.name.clone(), n.spec.inline))
            .collect();
        for node in &mut nodes {
            let mentioned = node.content.mentioned();
            node.textblock = !mentioned.is_empty()
                && mentioned.iter().all(|m| inline.get(*m).copied().unwrap_or(false));
            node.allowed_marks = match node.spec.marks.as_deref() {
                Some("_") => None,
                Some(list) => Some(filter_marks(&node.name, list)),
                None if node.textblock => None,
                None => Some(BTreeSet::new()),
            };
        }

        let marks = self
            .marks
            .iter()
            .enumerate()
            .map(|(rank, (name, spec))| {
                let excludes = match spec.excludes.as_deref() {
                    Some("_") => mark_names.iter().cloned().collect(),
                    Some(list) => filter_marks(name, list),
                    None => BTreeSet::from([name.clone()]),
                };
                MarkType {
                    name: name.clone(),
                    spec: spec.clone(),
                    rank,
                    excludes,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            nodes = nodes.len(),
            marks = marks.len(),
            "Built schema"
        );

        Ok(Schema {
            nodes,
            node_index,
            marks,
            mark_index,
        })
    }
}

/// The assembled, read-only structural schema.
#[derive(Debug, Clone)]
pub struct Schema {
    nodes: Vec<NodeType>,
    node_index: HashMap<String, usize>,
    marks: Vec<MarkType>,
    mark_index: HashMap<String, usize>,
}

impl Schema {
    /// Aggregate the node and mark declarations of `extensions`, in order.
    pub fn from_extensions(extensions: &[Box<dyn Extension>]) -> Result<Schema, SchemaError> {
        let mut builder = SchemaBuilder::new();
        for extension in extensions {
            if let Some(spec) = extension.node_spec() {
                builder = builder.node(extension.name(), spec);
            }
            if let Some(spec) = extension.mark_spec() {
                builder = builder.mark(extension.name(), spec);
            }
        }
        builder.build()
    }

    pub fn node_type(&self, name: &str) -> Option<&NodeType> {
        self.node_index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn mark_type(&self, name: &str) -> Option<&MarkType> {
        self.mark_index.get(name).map(|&i| &self.marks[i])
    }

    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.nodes.iter()
    }

    pub fn mark_types(&self) -> impl Iterator<Item = &MarkType> {
        self.marks.iter()
    }

    pub fn top_node_type(&self) -> &str {
        TOP_NODE
    }

    pub fn is_textblock(&self, name: &str) -> bool {
        self.node_type(name).is_some_and(NodeType::is_textblock)
    }

    pub fn is_inline(&self, name: &str) -> bool {
        self.node_type(name).is_some_and(NodeType::is_inline)
    }

    pub fn is_code(&self, name: &str) -> bool {
        self.node_type(name).is_some_and(NodeType::is_code)
    }

    fn node_type_or_err(&self, name: &str) -> Result<&NodeType, SchemaError> {
        self.node_type(name)
            .ok_or_else(|| SchemaError::UnknownNodeType(name.to_string()))
    }

    fn mark_type_or_err(&self, name: &str) -> Result<&MarkType, SchemaError> {
        self.mark_type(name)
            .ok_or_else(|| SchemaError::UnknownMarkType(name.to_string()))
    }

    fn mark_rank(&self, mark: &Mark) -> usize {
        self.mark_type(mark.mark_type())
            .map(MarkType::rank)
            .unwrap_or(usize::MAX)
    }

    fn mark_excludes(&self, a: &str, b: &str) -> bool {
        self.mark_type(a).is_some_and(|t| t.excludes(b))
    }

    /// Build a mark, filling defaults and validating attributes.
    pub fn mark(&self, name: &str, attrs: Attrs) -> Result<Mark, SchemaError> {
        let mark_type = self.mark_type_or_err(name)?;
        let attrs = compute_attrs(name, &mark_type.spec.attrs, attrs)?;
        Ok(Mark::new(name, attrs))
    }

    /// Build a text node. Marks are normalized into schema order.
    pub fn text(&self, text: impl Into<String>, marks: &[Mark]) -> Result<Node, SchemaError> {
        let text = text.into();
        if text.is_empty() {
            return Err(SchemaError::EmptyText);
        }
        for mark in marks {
            self.mark_type_or_err(mark.mark_type())?;
        }
        Ok(Node::text_node(text, self.mark_set(marks)))
    }

    /// Build a non-text node, validating attributes, content and marks.
    pub fn node(&self, name: &str, attrs: Attrs, content: Vec<Node>) -> Result<Node, SchemaError> {
        if name == TEXT_NODE {
            return Err(SchemaError::InvalidContent {
                node: name.to_string(),
                found: "use Schema::text".to_string(),
            });
        }
        let node_type = self.node_type_or_err(name)?;
        let attrs = compute_attrs(name, &node_type.spec.attrs, attrs)?;
        self.check_content(node_type, &content)?;
        Ok(Node::element(name, attrs, content))
    }

    /// Like [`Schema::node`], but when `content` is empty the required
    /// leading content of the type is created first.
    pub fn create_and_fill(
        &self,
        name: &str,
        attrs: Attrs,
        content: Vec<Node>,
    ) -> Result<Node, SchemaError> {
        let node_type = self.node_type_or_err(name)?;
        let content = if content.is_empty() {
            node_type
                .content
                .required_fill()
                .into_iter()
                .map(|child| self.create_and_fill(child, Attrs::new(), Vec::new()))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            content
        };
        self.node(name, attrs, content)
    }

    /// Rebuild `node` with new content, re-validating it.
    pub fn replace_content(&self, node: &Node, content: Vec<Node>) -> Result<Node, SchemaError> {
        let node_type = self.node_type_or_err(node.node_type())?;
        self.check_content(node_type, &content)?;
        Ok(node.with_content(content))
    }

    /// Rebuild `node` with new attributes, re-validating them.
    pub fn replace_attrs(&self, node: &Node, attrs: Attrs) -> Result<Node, SchemaError> {
        if node.is_text() {
            return Ok(node.clone());
        }
        let node_type = self.node_type_or_err(node.node_type())?;
        let attrs = compute_attrs(node.node_type(), &node_type.spec.attrs, attrs)?;
        Ok(node.with_attrs(attrs))
    }

    fn check_content(&self, node_type: &NodeType, content: &[Node]) -> Result<(), SchemaError> {
        let names: Vec<&str> = content.iter().map(Node::node_type).collect();
        if !node_type.content.matches(&names) {
            return Err(SchemaError::InvalidContent {
                node: node_type.name.clone(),
                found: names.join(", "),
            });
        }
        for child in content {
            if let Some(mark) = child
                .marks()
                .iter()
                .find(|m| !node_type.allows_mark(m.mark_type()))
            {
                return Err(SchemaError::DisallowedMark {
                    node: node_type.name.clone(),
                    mark: mark.mark_type().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Add `mark` to `set`, honouring exclusions and keeping rank order.
    pub fn add_mark(&self, set: &[Mark], mark: Mark) -> Vec<Mark> {
        let mut result = Vec::with_capacity(set.len() + 1);
        for other in set {
            if other == &mark {
                return set.to_vec();
            }
            if self.mark_excludes(mark.mark_type(), other.mark_type()) {
                continue;
            }
            if self.mark_excludes(other.mark_type(), mark.mark_type()) {
                return set.to_vec();
            }
            result.push(other.clone());
        }
        let rank = self.mark_rank(&mark);
        let pos = result
            .iter()
            .position(|o| self.mark_rank(o) > rank)
            .unwrap_or(result.len());
        result.insert(pos, mark);
        result
    }

    pub fn remove_mark(&self, set: &[Mark], mark_type: &str) -> Vec<Mark> {
        set.iter()
            .filter(|m| m.mark_type() != mark_type)
            .cloned()
            .collect()
    }

    /// Normalize an arbitrary list of marks into a canonical mark set.
    pub fn mark_set(&self, marks: &[Mark]) -> Vec<Mark> {
        marks
            .iter()
            .fold(Vec::new(), |set, mark| self.add_mark(&set, mark.clone()))
    }

    /// Reconstruct a node from its JSON form, validating every level.
    pub fn node_from_json(&self, value: &Value) -> Result<Node, SchemaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaError::InvalidJson("expected an object".into()))?;
        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::InvalidJson("missing `type`".into()))?;
        let attrs = match obj.get("attrs") {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Some(Value::Null) | None => Attrs::new(),
            Some(_) => return Err(SchemaError::InvalidJson("`attrs` must be an object".into())),
        };

        if type_name == TEXT_NODE {
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| SchemaError::InvalidJson("text node without `text`".into()))?;
            let marks = match obj.get("marks") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|m| self.mark_from_json(m))
                    .collect::<Result<Vec<_>, _>>()?,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => return Err(SchemaError::InvalidJson("`marks` must be an array".into())),
            };
            return self.text(text, &marks);
        }

        let content = match obj.get("content") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|c| self.node_from_json(c))
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(SchemaError::InvalidJson("`content` must be an array".into())),
        };
        self.node(type_name, attrs, content)
    }

    fn mark_from_json(&self, value: &Value) -> Result<Mark, SchemaError> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::InvalidJson("mark without `type`".into()))?;
        let attrs = match value.get("attrs") {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Attrs::new(),
        };
        self.mark(type_name, attrs)
    }
}

fn compute_attrs(
    type_name: &str,
    specs: &std::collections::BTreeMap<String, AttributeSpec>,
    mut given: Attrs,
) -> Result<Attrs, SchemaError> {
    let mut built = Attrs::new();
    for (name, spec) in specs {
        let value = match given.remove(name) {
            Some(value) => value,
            None => spec
                .default
                .clone()
                .ok_or_else(|| SchemaError::MissingAttribute {
                    type_name: type_name.to_string(),
                    attr: name.clone(),
                })?,
        };
        if let Some(validate) = spec.validate {
            if !validate(&value) {
                return Err(SchemaError::InvalidAttribute {
                    type_name: type_name.to_string(),
                    attr: name.clone(),
                    value,
                });
            }
        }
        built.insert(name.clone(), value);
    }
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn basic() -> SchemaBuilder {
        SchemaBuilder::new()
            .node("doc", NodeSpec::new().content("block+"))
            .node("paragraph", NodeSpec::new().content("inline*").group("block"))
            .node(
                "heading",
                NodeSpec::new()
                    .content("inline*")
                    .group("block")
                    .attr(
                        "level",
                        AttributeSpec::with_default(1).validate(|v| {
                            v.as_u64().is_some_and(|l| (1..=6).contains(&l))
                        }),
                    ),
            )
            .node("code_block", NodeSpec::new().content("text*").group("block").marks("").code())
            .node("text", NodeSpec::new().group("inline").inline())
            .mark("link", MarkSpec::new().attr("href", AttributeSpec::required()).non_inclusive())
            .mark("em", MarkSpec::new())
            .mark("strong", MarkSpec::new())
            .mark("code_inline", MarkSpec::new().excludes("_ widget").code())
    }

    #[test]
    fn unknown_content_reference_fails_at_build() {
        let err = basic()
            .node("figure", NodeSpec::new().content("caption image").group("block"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownContentReference {
                node: "figure".into(),
                token: "caption".into()
            }
        );
    }

    #[test]
    fn missing_core_types_fail() {
        let err = SchemaBuilder::new()
            .node("text", NodeSpec::new().inline())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingTopNode("doc".into()));

        let err = SchemaBuilder::new()
            .node("doc", NodeSpec::new())
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingTextNode);

        let err = basic().node("paragraph", NodeSpec::new()).build().unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("paragraph".into()));
    }

    #[test]
    fn unknown_marks_are_filtered() {
        let schema = basic()
            .node("caption", NodeSpec::new().content("text*").marks("em sparkle"))
            .build()
            .unwrap();
        let caption = schema.node_type("caption").unwrap();
        assert!(caption.allows_mark("em"));
        assert!(!caption.allows_mark("sparkle"));
        assert!(!caption.allows_mark("strong"));
        // "_ widget" resolves to every registered mark; the unknown name vanishes.
        let code = schema.mark_type("code_inline").unwrap();
        assert!(code.excludes("em"));
        assert!(!code.excludes("widget"));
    }

    #[test]
    fn textblocks_are_detected() {
        let schema = basic().build().unwrap();
        assert!(schema.is_textblock("paragraph"));
        assert!(!schema.is_textblock("doc"));
        assert!(schema.node_type("code_block").unwrap().is_code());
        assert!(!schema.node_type("code_block").unwrap().allows_mark("em"));
    }

    #[test]
    fn attributes_are_defaulted_and_validated() {
        let schema = basic().build().unwrap();
        let heading = schema.node("heading", Attrs::new(), vec![]).unwrap();
        assert_eq!(heading.attr_u64("level"), Some(1));

        let err = schema
            .node("heading", Attrs::from([("level".into(), json!(9))]), vec![])
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidAttribute { .. }));

        let err = schema.mark("link", Attrs::new()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingAttribute {
                type_name: "link".into(),
                attr: "href".into()
            }
        );
    }

    #[test]
    fn content_and_marks_are_checked() {
        let schema = basic().build().unwrap();
        let text = schema.text("x", &[]).unwrap();
        assert!(schema.node("doc", Attrs::new(), vec![text.clone()]).is_err());

        let em = schema.mark("em", Attrs::new()).unwrap();
        let em_text = schema.text("x", &[em]).unwrap();
        let err = schema
            .node("code_block", Attrs::new(), vec![em_text])
            .unwrap_err();
        assert!(matches!(err, SchemaError::DisallowedMark { .. }));
        assert_eq!(schema.text("", &[]), Err(SchemaError::EmptyText));
    }

    #[test]
    fn mark_sets_are_canonical() {
        let schema = basic().build().unwrap();
        let em = schema.mark("em", Attrs::new()).unwrap();
        let strong = schema.mark("strong", Attrs::new()).unwrap();
        let a = schema.mark_set(&[strong.clone(), em.clone()]);
        let b = schema.mark_set(&[em.clone(), strong.clone(), em.clone()]);
        assert_eq!(a, b);
        assert_eq!(a[0].mark_type(), "em");

        // code_inline excludes everything else.
        let code = schema.mark("code_inline", Attrs::new()).unwrap();
        assert_eq!(schema.add_mark(&a, code.clone()), vec![code]);

        let link_a = schema.mark("link", Attrs::from([("href".into(), json!("a"))])).unwrap();
        let link_b = schema.mark("link", Attrs::from([("href".into(), json!("b"))])).unwrap();
        let set = schema.add_mark(&[link_a], link_b.clone());
        assert_eq!(set, vec![link_b]);
    }

    #[test]
    fn create_and_fill_adds_required_children() {
        let schema = basic().build().unwrap();
        let doc = schema.create_and_fill("doc", Attrs::new(), vec![]).unwrap();
        assert_eq!(doc.child_count(), 1);
        assert_eq!(doc.content()[0].node_type(), "paragraph");
    }

    #[test]
    fn json_round_trip_revalidates() {
        let schema = basic().build().unwrap();
        let value = json!({
            "type": "doc",
            "content": [{"type": "heading", "attrs": {"level": 2}, "content": [
                {"type": "text", "text": "Hi", "marks": [{"type": "strong"}, {"type": "em"}]}
            ]}]
        });
        let doc = schema.node_from_json(&value).unwrap();
        let marks = doc.node_at(&[0, 0]).unwrap().marks();
        assert_eq!(marks[0].mark_type(), "em");
        assert_eq!(schema.node_from_json(&doc.to_json()).unwrap(), doc);

        let bad = json!({"type": "doc", "content": [{"type": "widget"}]});
        assert_eq!(
            schema.node_from_json(&bad),
            Err(SchemaError::UnknownNodeType("widget".into()))
        );
    }
}
