//! Dump the token stream the parser folds into a document.

use super::read_input;
use anyhow::Result;
use docweave_core::{Engine, ParserMode};
use std::path::Path;

pub fn print_tokens(engine: &Engine, input: &Path, paste: bool) -> Result<()> {
    let source = read_input(input)?;
    let mode = if paste {
        ParserMode::Paste
    } else {
        ParserMode::Document
    };
    for token in engine.tokenize(&source, mode) {
        println!("{}", serde_json::to_string(&token)?);
    }
    Ok(())
}
