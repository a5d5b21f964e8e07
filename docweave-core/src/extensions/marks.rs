//! Inline marks: links, emphasis, strong, strikethrough and code.

use super::commands::{attr_string, toggle_mark};
use super::image::{link_destination, link_title};
use crate::editor::input_rules::{mark_rule, no_attrs};
use crate::editor::{Command, CommandFn, InputRule, KeyBinding};
use crate::extension::Extension;
use crate::markdown::{backticks_for, Delimiter, GrammarOptions, MarkToMarkdown, MarkdownRule, ParseRule};
use crate::model::Attrs;
use crate::schema::{AttributeSpec, MarkSpec};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static LINK_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<full>\[(?P<text>[^\]]+)\]\((?P<href>[^)\s]+)\))$").expect("valid link rule regex")
});
static EM_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^*])(?P<full>\*(?P<text>[^*\s][^*]*)\*)$").expect("valid emphasis rule regex")
});
static STRONG_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^*])(?P<full>\*\*(?P<text>[^*\s][^*]*)\*\*)$").expect("valid strong rule regex")
});
static STRIKE_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^~])(?P<full>~~(?P<text>[^~\s][^~]*)~~)$").expect("valid strikethrough rule regex")
});
static CODE_RULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^`])(?P<full>`(?P<text>[^`]+)`)$").expect("valid inline code rule regex")
});

fn plain(_: &Attrs) -> Option<Attrs> {
    Some(Attrs::new())
}

fn toggle(mark: &'static str) -> CommandFn {
    toggle_mark(mark, plain)
}

pub struct Link;

fn link_attrs(attrs: &Attrs) -> Option<Attrs> {
    let href = attr_string(attrs, "href").filter(|h| !h.is_empty())?;
    let title = attr_string(attrs, "title").map(Value::from).unwrap_or(Value::Null);
    Some(Attrs::from([
        ("href".to_string(), Value::from(href)),
        ("title".to_string(), title),
    ]))
}

impl Extension for Link {
    fn name(&self) -> &str {
        "link"
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        Some(
            MarkSpec::new()
                .attr("href", AttributeSpec::required())
                .attr("title", AttributeSpec::with_default(Value::Null))
                .non_inclusive(),
        )
    }

    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        Some(
            MarkToMarkdown::new(
                "[",
                Delimiter::dynamic(|mark, _, _| {
                    format!(
                        "]({}{})",
                        link_destination(mark.attr_str("href").unwrap_or("")),
                        link_title(mark.attr_str("title"))
                    )
                }),
            )
            .mixable(),
        )
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::mark("link", "link"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("link", toggle_mark("link", link_attrs))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![mark_rule(&LINK_RULE, "link", |m| {
            Attrs::from([(
                "href".to_string(),
                Value::from(m.group("href").unwrap_or("")),
            )])
        })]
    }
}

pub struct Em;

impl Extension for Em {
    fn name(&self) -> &str {
        "em"
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        Some(MarkSpec::new())
    }

    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        Some(
            MarkToMarkdown::new("*", "*")
                .mixable()
                .expel_enclosing_whitespace(),
        )
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::mark("em", "em"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("em", toggle("em"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-i", toggle("em"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![mark_rule(&EM_RULE, "em", no_attrs)]
    }
}

pub struct Strong;

impl Extension for Strong {
    fn name(&self) -> &str {
        "strong"
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        Some(MarkSpec::new())
    }

    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        Some(
            MarkToMarkdown::new("**", "**")
                .mixable()
                .expel_enclosing_whitespace(),
        )
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::mark("strong", "strong"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("strong", toggle("strong"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-b", toggle("strong"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![mark_rule(&STRONG_RULE, "strong", no_attrs)]
    }
}

pub struct Strikethrough;

impl Extension for Strikethrough {
    fn name(&self) -> &str {
        "strikethrough"
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        Some(MarkSpec::new())
    }

    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        Some(
            MarkToMarkdown::new("~~", "~~")
                .mixable()
                .expel_enclosing_whitespace(),
        )
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::mark("s", "strikethrough"))
    }

    fn markdown_rules(&self) -> Vec<MarkdownRule> {
        vec![MarkdownRule::Options(GrammarOptions::ENABLE_STRIKETHROUGH)]
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("strikethrough", toggle("strikethrough"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-Shift-x", toggle("strikethrough"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![mark_rule(&STRIKE_RULE, "strikethrough", no_attrs)]
    }
}

/// Inline code. Excludes every other mark and is written verbatim, with
/// a backtick run longer than any inside the code.
pub struct CodeInline;

impl Extension for CodeInline {
    fn name(&self) -> &str {
        "code_inline"
    }

    fn mark_spec(&self) -> Option<MarkSpec> {
        Some(MarkSpec::new().excludes("_").code())
    }

    fn mark_to_markdown(&self) -> Option<MarkToMarkdown> {
        Some(
            MarkToMarkdown::new(
                Delimiter::dynamic(|_, parent, index| {
                    backticks_for(parent.child(index).and_then(|n| n.text()).unwrap_or(""), false)
                }),
                Delimiter::dynamic(|_, parent, index| {
                    let text = index
                        .checked_sub(1)
                        .and_then(|i| parent.child(i))
                        .and_then(|n| n.text())
                        .unwrap_or("");
                    backticks_for(text, true)
                }),
            )
            .no_escape(),
        )
    }

    fn parse_markdown(&self) -> Option<ParseRule> {
        Some(ParseRule::mark("code_inline", "code_inline"))
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("code_inline", toggle("code_inline"))]
    }

    fn keys(&self) -> Vec<KeyBinding> {
        vec![KeyBinding::new("Mod-e", toggle("code_inline"))]
    }

    fn input_rules(&self) -> Vec<InputRule> {
        vec![mark_rule(&CODE_RULE, "code_inline", no_attrs)]
    }
}
