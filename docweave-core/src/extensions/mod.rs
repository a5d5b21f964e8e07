//! Built-in content types and behaviours.
//!
//! Every descriptor here goes through the same [`Extension`] contract a
//! third-party type would use. [`FULL`] lists them in registration order,
//! which fixes mark ranks and the default block type.

mod blockquote;
mod code_block;
pub(crate) mod commands;
mod document;
mod editing;
mod embed;
mod find;
mod heading;
mod horizontal_rule;
mod image;
mod lists;
mod marks;
mod math;
mod mention;
mod notice;
mod table;

pub use blockquote::Blockquote;
pub use code_block::{CodeBlock, CodeBlockOptions};
pub use document::{Doc, HardBreak, Paragraph, Text};
pub use editing::{BasicEditing, History, SmartText, SmartTextOptions, TrailingNode, TrailingNodeOptions};
pub use embed::{Embed, EmbedOptions};
pub use find::{FindAndReplace, FindState, FIND_PLUGIN_KEY};
pub use heading::{Heading, HeadingOptions};
pub use horizontal_rule::HorizontalRule;
pub use image::Image;
pub use lists::{BulletList, CheckboxItem, CheckboxList, ListItem, OrderedList};
pub use marks::{CodeInline, Em, Link, Strikethrough, Strong};
pub use math::{MathBlock, MathInline};
pub use mention::Mention;
pub use notice::{ContainerNotice, NoticeOptions};
pub use table::{Table, TableCell, TableRow};

use crate::config::ConfigError;
use crate::extension::{merge_options, Extension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Every built-in descriptor, in registration order.
pub const FULL: &[&str] = &[
    "doc",
    "text",
    "paragraph",
    "heading",
    "blockquote",
    "bullet_list",
    "ordered_list",
    "list_item",
    "checkbox_list",
    "checkbox_item",
    "code_block",
    "horizontal_rule",
    "hard_break",
    "image",
    "table",
    "tr",
    "th",
    "td",
    "math_block",
    "math_inline",
    "mention",
    "container_notice",
    "embed",
    "link",
    "em",
    "strong",
    "strikethrough",
    "code_inline",
    "basic_editing",
    "history",
    "find_and_replace",
    "trailing_node",
    "smart_text",
];

/// CommonMark content types plus editing and history.
pub const BASIC: &[&str] = &[
    "doc",
    "text",
    "paragraph",
    "heading",
    "blockquote",
    "bullet_list",
    "ordered_list",
    "list_item",
    "code_block",
    "horizontal_rule",
    "hard_break",
    "image",
    "link",
    "em",
    "strong",
    "code_inline",
    "basic_editing",
    "history",
];

/// Merge `overrides` over the serialized defaults of `T` and read the
/// result back as `T`.
pub fn options_from<T>(extension: &str, overrides: &Value) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    let invalid = |err: serde_json::Error| ConfigError::InvalidOptions {
        extension: extension.to_string(),
        message: err.to_string(),
    };
    let defaults = serde_json::to_value(T::default()).map_err(invalid)?;
    serde_json::from_value(merge_options(defaults, overrides)).map_err(invalid)
}

/// Build one built-in descriptor by name.
pub fn build_extension(name: &str, options: &Value) -> Result<Box<dyn Extension>, ConfigError> {
    let extension: Box<dyn Extension> = match name {
        "doc" => Box::new(Doc),
        "text" => Box::new(Text),
        "paragraph" => Box::new(Paragraph),
        "heading" => Box::new(Heading::new(options_from(name, options)?)?),
        "blockquote" => Box::new(Blockquote),
        "bullet_list" => Box::new(BulletList),
        "ordered_list" => Box::new(OrderedList),
        "list_item" => Box::new(ListItem),
        "checkbox_list" => Box::new(CheckboxList),
        "checkbox_item" => Box::new(CheckboxItem),
        "code_block" => Box::new(CodeBlock::new(options_from(name, options)?)),
        "horizontal_rule" => Box::new(HorizontalRule),
        "hard_break" => Box::new(HardBreak),
        "image" => Box::new(Image),
        "table" => Box::new(Table),
        "tr" => Box::new(TableRow),
        "th" => Box::new(TableCell::header()),
        "td" => Box::new(TableCell::data()),
        "math_block" => Box::new(MathBlock),
        "math_inline" => Box::new(MathInline),
        "mention" => Box::new(Mention),
        "container_notice" => Box::new(ContainerNotice::new(options_from(name, options)?)?),
        "embed" => Box::new(Embed::new(options_from(name, options)?)?),
        "link" => Box::new(Link),
        "em" => Box::new(Em),
        "strong" => Box::new(Strong),
        "strikethrough" => Box::new(Strikethrough),
        "code_inline" => Box::new(CodeInline),
        "basic_editing" => Box::new(BasicEditing),
        "history" => Box::new(History),
        "find_and_replace" => Box::new(FindAndReplace),
        "trailing_node" => Box::new(TrailingNode::new(options_from(name, options)?)),
        "smart_text" => Box::new(SmartText::new(options_from(name, options)?)),
        other => return Err(ConfigError::UnknownExtension(other.to_string())),
    };
    Ok(extension)
}

fn build_all(names: &[&str]) -> Vec<Box<dyn Extension>> {
    names
        .iter()
        .filter_map(|name| build_extension(name, &Value::Null).ok())
        .collect()
}

/// Every built-in descriptor with default options.
pub fn default_extensions() -> Vec<Box<dyn Extension>> {
    build_all(FULL)
}

pub fn basic_extensions() -> Vec<Box<dyn Extension>> {
    build_all(BASIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_listed_name_builds() {
        for name in FULL {
            let extension = build_extension(name, &Value::Null).unwrap();
            assert_eq!(extension.name(), *name);
        }
        assert_eq!(default_extensions().len(), FULL.len());
    }

    #[test]
    fn options_merge_over_defaults() {
        let options: HeadingOptions = options_from("heading", &json!({"levels": [1, 2]})).unwrap();
        assert_eq!(options.levels, vec![1, 2]);
        let options: HeadingOptions = options_from("heading", &Value::Null).unwrap();
        assert_eq!(options.levels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            build_extension("blink", &Value::Null),
            Err(ConfigError::UnknownExtension(name)) if name == "blink"
        ));
    }
}
