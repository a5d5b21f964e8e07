//! Structural declarations contributed by node and mark extensions.

use serde_json::Value;
use std::collections::BTreeMap;

/// Declaration of a single attribute.
#[derive(Debug, Clone, Default)]
pub struct AttributeSpec {
    /// Value used when the attribute is not supplied. `None` makes the
    /// attribute required.
    pub default: Option<Value>,
    pub validate: Option<fn(&Value) -> bool>,
}

impl AttributeSpec {
    pub fn required() -> Self {
        Self::default()
    }

    pub fn with_default(value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
            validate: None,
        }
    }

    pub fn validate(mut self, f: fn(&Value) -> bool) -> Self {
        self.validate = Some(f);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    /// Content expression. `None` declares a leaf.
    pub content: Option<String>,
    /// Space separated group names.
    pub group: Option<String>,
    /// Allowed marks: space separated names, `"_"` for all, `""` for none.
    /// Defaults to all marks for textblocks and none otherwise.
    pub marks: Option<String>,
    pub attrs: BTreeMap<String, AttributeSpec>,
    pub inline: bool,
    pub atom: bool,
    /// Content is code: input rules and mark commands do not apply inside.
    pub code: bool,
    pub defining: bool,
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, expr: &str) -> Self {
        self.content = Some(expr.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn marks(mut self, marks: &str) -> Self {
        self.marks = Some(marks.to_string());
        self
    }

    pub fn attr(mut self, name: &str, spec: AttributeSpec) -> Self {
        self.attrs.insert(name.to_string(), spec);
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn atom(mut self) -> Self {
        self.atom = true;
        self
    }

    pub fn code(mut self) -> Self {
        self.code = true;
        self
    }

    pub fn defining(mut self) -> Self {
        self.defining = true;
        self
    }

    pub(crate) fn groups(&self) -> impl Iterator<Item = &str> {
        self.group.as_deref().unwrap_or("").split_whitespace()
    }
}

#[derive(Debug, Clone)]
pub struct MarkSpec {
    pub attrs: BTreeMap<String, AttributeSpec>,
    /// Marks that cannot coexist with this one: space separated names, `"_"`
    /// for all. Defaults to the mark itself.
    pub excludes: Option<String>,
    /// Whether the mark extends to text typed at its end.
    pub inclusive: bool,
    /// Code marks suppress other marks and input rules inside them.
    pub code: bool,
}

impl Default for MarkSpec {
    fn default() -> Self {
        Self {
            attrs: BTreeMap::new(),
            excludes: None,
            inclusive: true,
            code: false,
        }
    }
}

impl MarkSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, spec: AttributeSpec) -> Self {
        self.attrs.insert(name.to_string(), spec);
        self
    }

    pub fn excludes(mut self, excludes: &str) -> Self {
        self.excludes = Some(excludes.to_string());
        self
    }

    pub fn non_inclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }

    pub fn code(mut self) -> Self {
        self.code = true;
        self
    }
}
