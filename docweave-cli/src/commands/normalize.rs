//! Rewrite Markdown in canonical form.

use super::read_input;
use anyhow::{bail, Context, Result};
use docweave_core::Engine;
use std::path::Path;
use tracing::debug;

pub fn normalize_file(engine: &Engine, input: &Path, output: Option<&Path>, check: bool) -> Result<()> {
    let source = read_input(input)?;
    let normalized = engine
        .normalize(&source)
        .with_context(|| format!("Failed to serialize {}", input.display()))?;

    if check {
        if source.trim_end_matches('\n') != normalized {
            bail!("{} is not in canonical form", input.display());
        }
        debug!(input = %input.display(), "Already canonical");
        return Ok(());
    }

    match output {
        Some(path) => {
            std::fs::write(path, format!("{normalized}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{normalized}"),
    }
    Ok(())
}
