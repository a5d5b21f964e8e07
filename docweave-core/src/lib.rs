//! # docweave-core
//!
//! Extensible document-model engine.
//!
//! Content types are contributed by capability descriptors ([`Extension`]).
//! The [`Engine`] aggregates them into a validated [`Schema`], a
//! deterministic Markdown serializer and parser, and flat command, key and
//! input-rule tables. An [`Editor`] runs one editing session on top.

pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod markdown;
pub mod model;
pub mod schema;

pub use config::{ConfigError, EngineConfig, Preset};
pub use editor::{Editor, EditorState, Position, Selection, Transaction};
pub use engine::Engine;
pub use error::{EditorError, SchemaError, SerializeError};
pub use extension::{Extension, ExtensionKind, ExtensionRegistry};
pub use markdown::{ParserMode, SerializerOptions};
pub use model::{Attrs, Mark, Node};
pub use schema::{Schema, SchemaBuilder};
