//! Integration tests for the depwatch binary.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_scenario(content: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("scenario.yml");
    fs::write(&path, content).unwrap();
    (temp, path)
}

const REQUIRED_SCENARIO: &str = r#"
component:
  name: client
  instances: [impl]
  dependencies:
    api:
      required: true
      filter: "(Module-SymbolicName=org.example.api)"
      callbacks:
        added: bind
        removed: unbind
steps:
  - action: install
    provider: first
    attributes:
      Module-SymbolicName: org.example.api
  - action: install
    provider: other
    attributes:
      Module-SymbolicName: org.example.other
  - action: uninstall
    provider: first
"#;

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("filter"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn cli_requires_subcommand() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.assert().failure();
    Ok(())
}

#[test]
fn replay_prints_trace() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp, path) = write_scenario(REQUIRED_SCENARIO);
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("replay").arg(&path);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("step 1: install first (#1)"))
        .stdout(predicate::str::contains("  component registered"))
        .stdout(predicate::str::contains("  impl.bind(#1)"))
        .stdout(predicate::str::contains("  impl.unbind(#1)"))
        .stdout(predicate::str::contains("component client: not registered"));
    Ok(())
}

#[test]
fn replay_json_output() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp, path) = write_scenario(REQUIRED_SCENARIO);
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("replay").arg(&path).arg("--json");
    let output = cmd.assert().success().get_output().stdout.clone();

    let report: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(report["component"], "client");
    assert_eq!(report["registered"], false);
    assert_eq!(report["dependencies"][0]["state"], "required_unavailable");
    assert_eq!(report["counts"]["available"], 1);
    assert_eq!(report["counts"]["unavailable"], 1);
    Ok(())
}

#[test]
fn replay_missing_file_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("replay").arg("/nonexistent/scenario.yml");
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration not found"));
    Ok(())
}

#[test]
fn replay_invalid_filter_fails() -> Result<(), Box<dyn std::error::Error>> {
    let (_temp, path) = write_scenario(
        "component:\n  name: c\n  dependencies:\n    api:\n      filter: \"(broken\"\n",
    );
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.arg("replay").arg(&path);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid filter"));
    Ok(())
}

#[test]
fn filter_match_exits_zero() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.args([
        "filter",
        "(&(Module-SymbolicName=org.example.*)(Module-Version>=2))",
        "-a",
        "Module-SymbolicName=org.example.api",
        "-a",
        "Module-Version=10",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "(&(Module-SymbolicName=org.example.*)(Module-Version>=2))",
        ))
        .stdout(predicate::str::contains("match"));
    Ok(())
}

#[test]
fn filter_no_match_exits_two() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.args(["filter", "(vendor=acme)", "-a", "vendor=other"]);
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("no match"));
    Ok(())
}

#[test]
fn filter_parse_error_exits_one() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("depwatch"));
    cmd.args(["filter", "(vendor=acme"]);
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("at position"));
    Ok(())
}
