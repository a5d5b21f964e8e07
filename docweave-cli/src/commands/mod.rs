//! CLI command implementations.

pub mod check;
pub mod normalize;
pub mod schema;
pub mod tokens;

pub use check::check_files;
pub use normalize::normalize_file;
pub use schema::describe_schema;
pub use tokens::print_tokens;

use anyhow::{Context, Result};
use docweave_core::{Engine, EngineConfig};
use std::io::Read;
use std::path::Path;

const DEFAULT_CONFIG: &str = "docweave.yml";

/// Build the engine from `config`, or from `./docweave.yml` when it exists,
/// or from the defaults.
pub fn load_engine(config: Option<&Path>) -> Result<Engine> {
    let config = match config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            EngineConfig::from_file(DEFAULT_CONFIG).context("Failed to load configuration")?
        }
        None => EngineConfig::default(),
    };
    Engine::from_config(&config).context("Failed to build engine from configuration")
}

/// Read a file, or stdin for `-`.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
