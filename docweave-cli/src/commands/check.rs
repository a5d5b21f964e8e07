//! Round-trip checks over Markdown files.

use super::read_input;
use anyhow::{bail, Result};
use docweave_core::Engine;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct FileReport {
    path: PathBuf,
    /// Input already matches the serializer's output.
    canonical: bool,
    /// Serializing the re-parsed output gives the same text.
    stable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn check_one(engine: &Engine, path: &Path) -> FileReport {
    let report = |canonical, stable, error: Option<String>| FileReport {
        path: path.to_path_buf(),
        canonical,
        stable,
        error,
    };
    let source = match read_input(path) {
        Ok(source) => source,
        Err(err) => return report(false, false, Some(format!("{err:#}"))),
    };
    let first = match engine.normalize(&source) {
        Ok(text) => text,
        Err(err) => return report(false, false, Some(err.to_string())),
    };
    let canonical = source.trim_end_matches('\n') == first;
    match engine.normalize(&first) {
        Ok(second) => report(canonical, first == second, None),
        Err(err) => report(canonical, false, Some(err.to_string())),
    }
}

/// Check every file; fails when any file does not round-trip stably.
pub fn check_files(engine: &Engine, files: &[PathBuf], json: bool) -> Result<()> {
    let reports: Vec<FileReport> = files.iter().map(|path| check_one(engine, path)).collect();
    let failures = reports.iter().filter(|r| !r.stable).count();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            let status = match (&report.error, report.stable, report.canonical) {
                (Some(err), _, _) => format!("error: {err}"),
                (None, false, _) => "unstable".to_string(),
                (None, true, false) => "reformat".to_string(),
                (None, true, true) => "ok".to_string(),
            };
            println!("{}: {}", report.path.display(), status);
        }
    }

    if failures > 0 {
        bail!("{failures} file(s) failed the round-trip check");
    }
    Ok(())
}
