//! Basic CLI tests for the nonbiri command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `nonbiri` command isolated to a scratch directory.
fn nonbiri(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nonbiri").unwrap();
    cmd.env_remove("NONBIRI_CONFIG")
        .env("NONBIRI_EXTENSIONS_DIR", dir.path().join("extensions"))
        .env("NONBIRI_DATABASE", dir.path().join("library.redb"))
        .env("RUST_LOG", "off");
    cmd
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("nonbiri").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("extensions"))
        .stdout(predicate::str::contains("browse"))
        .stdout(predicate::str::contains("library"))
        .stdout(predicate::str::contains("index"));
}

/// Test that the CLI shows version information.
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("nonbiri").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("nonbiri"));
}

/// Test that providing no subcommand shows an error.
#[test]
fn test_no_subcommand_shows_error() {
    let mut cmd = Command::cargo_bin("nonbiri").unwrap();

    // Clap's error code for a missing required subcommand
    cmd.assert().failure().code(2);
}

#[test]
fn test_extensions_list_empty() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .args(["extensions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_library_list_creates_database() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .args(["library", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
    assert!(dir.path().join("library.redb").exists());
}

#[test]
fn test_library_remove_unknown_fails() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .args(["library", "remove", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in the library"));
}

#[test]
fn test_library_status_rejects_unknown_status() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .args(["library", "status", "1", "sleeping"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_browse_unknown_source_fails() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .args(["browse", "latest", "mangadex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not loaded"));
}

#[test]
fn test_index_build_empty_dir() {
    let dir = TempDir::new().unwrap();
    let modules = dir.path().join("linux");
    std::fs::create_dir_all(&modules).unwrap();

    nonbiri(&dir)
        .args(["index", "build"])
        .arg(&modules)
        .assert()
        .success();

    let document = std::fs::read_to_string(dir.path().join("linux.json")).unwrap();
    assert_eq!(document.trim(), "{}");
}

#[test]
fn test_invalid_config_value_fails() {
    let dir = TempDir::new().unwrap();
    nonbiri(&dir)
        .env("NONBIRI_INDEX_COOLDOWN_SECS", "soon")
        .args(["extensions", "list"])
        .assert()
        .failure();
}
