//! Error types shared across the engine.

use serde_json::Value;
use thiserror::Error;

/// Structural errors raised while building a schema or constructing nodes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate type name: {0}")]
    DuplicateType(String),

    #[error("Schema is missing the top node type `{0}`")]
    MissingTopNode(String),

    #[error("Schema is missing the `text` node type")]
    MissingTextNode,

    #[error("Content expression of `{node}` references unknown type or group `{token}`")]
    UnknownContentReference { node: String, token: String },

    #[error("Invalid content expression for `{node}`: {message}")]
    InvalidContentExpression { node: String, message: String },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Unknown mark type: {0}")]
    UnknownMarkType(String),

    #[error("Missing required attribute `{attr}` on `{type_name}`")]
    MissingAttribute { type_name: String, attr: String },

    #[error("Invalid value {value} for attribute `{attr}` on `{type_name}`")]
    InvalidAttribute {
        type_name: String,
        attr: String,
        value: Value,
    },

    #[error("Invalid content for `{node}`: [{found}]")]
    InvalidContent { node: String, found: String },

    #[error("Mark `{mark}` is not allowed inside `{node}`")]
    DisallowedMark { node: String, mark: String },

    #[error("Empty text nodes are not allowed")]
    EmptyText,

    #[error("Invalid node JSON: {0}")]
    InvalidJson(String),
}

/// Errors raised while rendering a document to Markdown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("`{name}` does not implement to_markdown")]
    MissingSerializer { name: String },

    #[error("No extension registered for node type `{0}`")]
    UnknownNodeType(String),

    #[error("No markdown delimiters registered for mark `{0}`")]
    UnknownMarkType(String),
}

/// Errors raised while applying transactions to an editor state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Invalid path {0:?}")]
    InvalidPath(Vec<usize>),

    #[error("Range {from}..{to} is out of bounds (length {len})")]
    RangeOutOfBounds { from: usize, to: usize, len: usize },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Editor has been destroyed")]
    Destroyed,
}
