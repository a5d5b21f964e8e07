//! # docweave CLI
//!
//! Normalize, check and inspect Markdown with the docweave engine.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to ./docweave.yml when present)
    #[arg(long, env = "DOCWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite Markdown in canonical form
    Normalize {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long, conflicts_with = "check")]
        output: Option<PathBuf>,

        /// Fail if the input is not already canonical
        #[arg(long)]
        check: bool,
    },

    /// Verify that files survive a parse/serialize round trip unchanged
    Check {
        /// Files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Describe the configured schema
    Schema {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the token stream for a file as JSON lines
    Tokens {
        /// Input file, or `-` for stdin
        input: PathBuf,

        /// Tokenize as pasted text (no block syntax)
        #[arg(long)]
        paste: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable.
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let engine = commands::load_engine(cli.config.as_deref())?;
    match cli.command {
        Commands::Normalize { input, output, check } => {
            commands::normalize_file(&engine, &input, output.as_deref(), check)
        }
        Commands::Check { files, json } => commands::check_files(&engine, &files, json),
        Commands::Schema { json } => commands::describe_schema(&engine, json),
        Commands::Tokens { input, paste } => commands::print_tokens(&engine, &input, paste),
    }
}
