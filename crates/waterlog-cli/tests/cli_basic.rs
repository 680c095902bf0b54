//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with HOME pointed at a temp dir, so every
//! test gets its own config and database.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_waterlog"))
        .args(args)
        .env("HOME", home)
        .env_remove("WATERLOG_ENV")
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_DATA_HOME")
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_log_creates_pending_record() {
    let home = tempfile::tempdir().unwrap();
    let record = run_json(
        home.path(),
        &["activity", "log", "shower", "42.5", "--duration-secs", "300", "--eco"],
    );
    assert_eq!(record["sync_status"], "PENDING");
    assert_eq!(record["payload"]["activity_type"], "SHOWER");
    assert_eq!(record["payload"]["is_eco_mode"], true);
    assert!(record["remote_id"].is_null());

    let (stdout, _, code) = run_cli(home.path(), &["activity", "pending"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1");
}

#[test]
fn test_list_returns_logged_records() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["activity", "log", "tap", "2"]);
    run_json(home.path(), &["activity", "log", "dishes", "12"]);

    let list = run_json(home.path(), &["activity", "list"]);
    assert_eq!(list.as_array().map(Vec::len), Some(2));

    let pending = run_json(home.path(), &["activity", "list", "--pending"]);
    assert_eq!(pending.as_array().map(Vec::len), Some(2));
}

#[test]
fn test_log_rejects_unknown_type_and_negative_liters() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["activity", "log", "pool", "2"]);
    assert_ne!(code, 0);

    let (_, stderr, code) = run_cli(home.path(), &["activity", "log", "tap", "--", "-1"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("liters_used"), "unexpected stderr: {stderr}");
}

#[test]
fn test_sync_without_remote_is_not_configured() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["activity", "log", "toilet", "6"]);

    let outcome = run_json(home.path(), &["sync", "push"]);
    assert_eq!(outcome["outcome"], "not_configured");

    // Not configured ends the cycle without a retry.
    let report = run_json(home.path(), &["sync", "run"]);
    assert_eq!(report["retry"], false);
    assert_eq!(report["pending_count"], 1);
}

#[test]
fn test_config_set_persists() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        home.path(),
        &["config", "set", "sync.periodic_interval_minutes", "30"],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(
        home.path(),
        &["config", "get", "sync.periodic_interval_minutes"],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "30");

    let config = run_json(home.path(), &["config", "list"]);
    assert_eq!(config["remote"]["table"], "water_activities");
}

#[test]
fn test_config_unknown_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "remote.nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));

    let (_, _, code) = run_cli(home.path(), &["config", "set", "remote.nope", "1"]);
    assert_ne!(code, 0);
}

#[test]
fn test_config_path_is_under_home() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with("config.toml"));
    assert!(stdout.contains(".config"));
}
