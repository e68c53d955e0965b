//! CLI end-to-end tests
//!
//! Exercise the paths of the transcode-queue binary that do not need ffmpeg.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the transcode-queue binary
#[allow(deprecated)]
fn transcode_cmd() -> Command {
    Command::cargo_bin("transcode-queue").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    transcode_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    transcode_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("transcode-queue"));
}

#[test]
fn test_cli_run_help() {
    transcode_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--video-bitrate"))
        .stdout(predicate::str::contains("--watch"));
}

#[test]
fn test_cli_run_without_inputs() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "").unwrap();

    transcode_cmd()
        .args(["run", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No input files"));
}

#[test]
fn test_cli_run_rejects_bad_bitrate() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "").unwrap();

    transcode_cmd()
        .args(["run", "clip.avi", "--video-bitrate", "fast", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bitrate"));
}

#[test]
fn test_cli_watch_requires_hot_folder() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "hot_folder_enabled = false\n").unwrap();

    transcode_cmd()
        .args(["run", "--watch", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("hot_folder_enabled"));
}

#[test]
fn test_cli_init_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transcode-queue.toml");

    transcode_cmd()
        .arg("init-config")
        .arg(&path)
        .assert()
        .success();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("hot_folder_enabled = false"));
    assert!(content.contains("[default_profile]"));

    // Refuses to overwrite without --force
    transcode_cmd()
        .arg("init-config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    transcode_cmd()
        .args(["init-config", "--force"])
        .arg(&path)
        .assert()
        .success();
}
