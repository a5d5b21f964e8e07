use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn docweave() -> Result<Command, Box<dyn std::error::Error>> {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("docweave")?;
    cmd.env_remove("DOCWEAVE_CONFIG");
    Ok(cmd)
}

#[test]
fn normalize_rewrites_to_canonical_form() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("note.md");
    fs::write(&input, "Title\n=====\n\n* one\n* two\n\n__bold__\n")?;

    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "note.md"])
        .assert()
        .success()
        .stdout("# Title\n\n- one\n- two\n\n**bold**\n");
    Ok(())
}

#[test]
fn normalize_reads_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "-"])
        .write_stdin("_soft_ text")
        .assert()
        .success()
        .stdout("*soft* text\n");
    Ok(())
}

#[test]
fn normalize_check_flags_non_canonical_input() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("good.md"), "# Title\n\n- one\n")?;
    fs::write(dir.path().join("bad.md"), "* one\n")?;

    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "--check", "good.md"])
        .assert()
        .success();
    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "--check", "bad.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in canonical form"));
    Ok(())
}

#[test]
fn normalize_writes_output_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("in.md"), "1) first\n2) second\n")?;

    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "in.md", "--output", "out.md"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(dir.path().join("out.md"))?, "1. first\n2. second\n");
    Ok(())
}

#[test]
fn check_reports_each_file_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(dir.path().join("a.md"), "Plain text\n")?;
    fs::write(dir.path().join("b.md"), "* loose\n")?;

    let assert = docweave()?
        .current_dir(dir.path())
        .args(["check", "--json", "a.md", "b.md"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    let reports = value.as_array().expect("json array");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["canonical"], true);
    assert_eq!(reports[1]["canonical"], false);
    assert!(reports.iter().all(|r| r["stable"] == true));
    Ok(())
}

#[test]
fn check_fails_for_missing_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    docweave()?
        .current_dir(dir.path())
        .args(["check", "missing.md"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing.md: error"));
    Ok(())
}

#[test]
fn config_file_trims_the_schema() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::write(
        dir.path().join("docweave.yml"),
        "preset: basic\ndisabled: [image]\nserializer:\n  bullet: \"*\"\n",
    )?;

    let assert = docweave()?
        .current_dir(dir.path())
        .args(["schema", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let value: Value = serde_json::from_str(&stdout)?;
    assert_eq!(value["top"], "doc");
    let names: Vec<&str> = value["nodes"]
        .as_array()
        .expect("nodes array")
        .iter()
        .filter_map(|n| n["name"].as_str())
        .collect();
    assert!(names.contains(&"heading"));
    assert!(!names.contains(&"image"));
    assert!(!names.contains(&"table"));

    docweave()?
        .current_dir(dir.path())
        .args(["normalize", "-"])
        .write_stdin("- a\n- b")
        .assert()
        .success()
        .stdout("* a\n* b\n");
    Ok(())
}

#[test]
fn unknown_extension_in_config_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = dir.path().join("custom.yml");
    fs::write(&config, "disabled: [sparkles]\n")?;

    docweave()?
        .current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("schema")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown extension: sparkles"));
    Ok(())
}

#[test]
fn tokens_are_printed_as_json_lines() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let assert = docweave()?
        .current_dir(dir.path())
        .args(["tokens", "-"])
        .write_stdin("# Hi")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone())?;
    let first: Value = serde_json::from_str(stdout.lines().next().expect("a token"))?;
    assert_eq!(first["name"], "heading");
    assert_eq!(first["nesting"], "open");
    Ok(())
}
