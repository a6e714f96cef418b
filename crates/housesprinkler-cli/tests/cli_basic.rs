//! Subprocess-driven CLI integration tests, grounded in the teacher's
//! `tests/cli_basic.rs` invocation style: spawn the built binary, capture
//! JSON stdout, assert on it.

use std::path::Path;
use std::process::{Command, Output};

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_housesprinkler-cli"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to spawn CLI binary")
}

fn run_cli_success(dir: &Path, args: &[&str]) -> String {
    let output = run_cli(dir, args);
    assert!(
        output.status.success(),
        "expected success, got {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("sprinkler.json");
    std::fs::write(
        &path,
        r#"{
            "zones": [{"name": "Front", "pulse": 60, "pause": 30}],
            "programs": [{"name": "Morning", "zones": [{"zone_name": "Front", "share": 60}]}]
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn config_validate_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let stdout = run_cli_success(
        dir.path(),
        &["--config", config.to_str().unwrap(), "config", "validate"],
    );
    assert!(stdout.contains("1 zone(s)"));
    assert!(stdout.contains("1 program(s)"));
}

#[test]
fn config_rejects_unknown_zone_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sprinkler.json");
    std::fs::write(
        &path,
        r#"{"zones": [], "programs": [{"name": "P", "zones": [{"zone_name": "Ghost", "share": 1}]}]}"#,
    )
    .unwrap();
    let output = run_cli(dir.path(), &["--config", path.to_str().unwrap(), "config", "validate"]);
    assert!(!output.status.success());
}

#[test]
fn zone_list_reports_unknown_control_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let stdout = run_cli_success(
        dir.path(),
        &["--config", config.to_str().unwrap(), "zone", "list"],
    );
    assert!(stdout.contains("Front: u"));
}

#[test]
fn zone_on_rejects_unknown_zone() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let output = run_cli(
        dir.path(),
        &["--config", config.to_str().unwrap(), "zone", "on", "Ghost", "10"],
    );
    assert!(!output.status.success());
}

#[test]
fn schedule_add_then_list_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let config_str = config.to_str().unwrap();
    run_cli_success(
        dir.path(),
        &["--config", config_str, "schedule", "add", "Morning", "6", "0"],
    );
    let stdout = run_cli_success(dir.path(), &["--config", config_str, "schedule", "list"]);
    assert!(stdout.contains("Morning at 06:00"));
}

#[test]
fn status_includes_declared_control_points() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let stdout = run_cli_success(
        dir.path(),
        &["--config", config.to_str().unwrap(), "status"],
    );
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["control"]["Front"]["state"], "u");
}

#[test]
fn test_flag_runs_simulation_without_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let stdout = run_cli_success(dir.path(), &["--test"]);
    assert!(stdout.contains("simulation"));
}
