//! Integration tests for the `tether` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! config handling and short simulation runs.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `tether` binary with env isolation.
///
/// Clears `TETHER_*` / `RUST_LOG` and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
/// The simulator timings are shortened to keep runs fast.
fn tether_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("tether");
    cmd.env("HOME", "/tmp/tether-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/tether-cli-test-nonexistent")
        .env_remove("TETHER_CONFIG")
        .env_remove("TETHER_SESSION__STRICT_TRANSITIONS")
        .env_remove("TETHER_LOG__LEVEL")
        .env_remove("RUST_LOG")
        .env("TETHER_SIMULATOR__HOLD_MS", "80")
        .env("TETHER_SIMULATOR__METADATA_DELAY_MS", "5")
        .env("TETHER_SIMULATOR__SESSION_TICK_MS", "20");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn write_file(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

/// Run `simulate` with JSON output and return the recorded events.
fn simulate_json(extra: &[&str]) -> Vec<Value> {
    let output = tether_cmd()
        .args(["--output", "json", "simulate"])
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "simulate failed:\n{}",
        combined_output(&output)
    );
    let parsed: Value = serde_json::from_slice(&output.stdout).unwrap();
    parsed.as_array().unwrap().clone()
}

fn has_event(events: &[Value], channel: &str, value: &str) -> bool {
    events
        .iter()
        .any(|e| e["channel"] == channel && e["value"].as_str().is_some_and(|v| v.starts_with(value)))
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = tether_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    tether_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("simulate")
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    tether_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tether"));
}

#[test]
fn test_invalid_subcommand() {
    let output = tether_cmd().arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    tether_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    tether_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_show_defaults() {
    // No file at the default location: defaults plus env overrides.
    tether_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[session]")
                .and(predicate::str::contains("drain_timeout_ms = 5000"))
                .and(predicate::str::contains("hold_ms = 80")),
        );
}

#[test]
fn test_config_path_honours_flag() {
    tether_cmd()
        .args(["--config", "/tmp/custom-tether.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/custom-tether.toml"));
}

#[test]
fn test_config_show_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    tether_cmd()
        .arg("--config")
        .arg(&missing)
        .args(["config", "show"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tether").join("config.toml");

    tether_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.is_file());

    let output = tether_cmd()
        .arg("--config")
        .arg(&path)
        .args(["--output", "json", "config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cfg: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(cfg["session"]["drain_timeout_ms"], 5000);
    assert_eq!(cfg["session"]["strict_transitions"], false);

    // A second init must not clobber the file.
    tether_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("--force"));

    tether_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_invalid_level() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    write_file(&path, "[log]\nlevel = \"shouty\"\n");

    tether_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("log.level"));
}

// ── Simulate ────────────────────────────────────────────────────────

#[test]
fn test_simulate_records_every_stream() {
    let events = simulate_json(&["--cycles", "2"]);

    assert!(has_event(&events, "connection", "connected sim-1"));
    assert!(has_event(&events, "connection", "connected sim-2"));
    assert!(has_event(&events, "scope", "opened for sim-1"));
    assert!(has_event(&events, "scope", "opened for sim-2"));
    assert!(has_event(&events, "metadata", ""));
    assert!(has_event(&events, "token", "logged_in"));

    let rejected = events
        .iter()
        .filter(|e| e["channel"] == "session")
        .count();
    assert_eq!(rejected, 2, "one rejected spawn per disconnect");

    let generations: Vec<u64> = events
        .iter()
        .filter(|e| e["channel"] == "scope")
        .filter_map(|e| e["generation"].as_u64())
        .collect();
    assert!(generations.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_simulate_table_output() {
    tether_cmd()
        .args(["--color", "never", "simulate", "--cycles", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Channel")
                .and(predicate::str::contains("connection"))
                .and(predicate::str::contains("1 cycles")),
        );
}

#[test]
fn test_simulate_plain_output() {
    tether_cmd()
        .args(["--output", "plain", "simulate", "--cycles", "1", "--no-login"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\tconnection\t")
                .and(predicate::str::contains("logged_in").not()),
        );
}

#[test]
fn test_simulate_lenient_accepts_skipped_connecting() {
    let events = simulate_json(&["--cycles", "1", "--skip-connecting"]);
    assert!(has_event(&events, "connection", "connected sim-1"));
}

#[test]
fn test_simulate_strict_rejects_skipped_connecting() {
    tether_cmd()
        .args(["simulate", "--cycles", "1", "--strict", "--skip-connecting"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid connection transition"));
}

#[test]
fn test_simulate_zero_cycles() {
    tether_cmd()
        .args(["simulate", "--cycles", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cycles"));
}

#[test]
fn test_simulate_writes_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("tether.log");

    tether_cmd()
        .arg("--log-file")
        .arg(&log)
        .args(["-vv", "--quiet", "simulate", "--cycles", "1"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("session scope opened"), "log file:\n{contents}");
}
