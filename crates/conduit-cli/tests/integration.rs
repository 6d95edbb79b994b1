//! Integration tests for conduit-cli.
//!
//! Invokes the `conduit` binary against the sample topologies shipped at the
//! repository root.

use std::path::PathBuf;
use std::process::Command;

fn conduit_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_conduit"))
}

fn topology(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../topologies").join(name)
}

// ============================================================================
// `conduit drivers`
// ============================================================================

#[test]
fn drivers_lists_every_builtin() {
    let output = conduit_bin().arg("drivers").output().expect("failed to run conduit drivers");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Available Drivers"));
    for tag in ["host", "dai", "volume", "src", "mixer", "detect"] {
        assert!(stdout.contains(tag), "listing should contain '{tag}'");
    }
}

#[test]
fn drivers_shows_params() {
    let output = conduit_bin().args(["drivers", "volume"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("gain_db"));
}

#[test]
fn drivers_rejects_unknown_type() {
    let output = conduit_bin().args(["drivers", "reverb"]).output().unwrap();
    assert!(!output.status.success());
}

// ============================================================================
// `conduit validate`
// ============================================================================

#[test]
fn validate_accepts_sample_topology() {
    let output = conduit_bin().arg("validate").arg(topology("playback.toml")).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("OK"));
    assert!(stdout.contains("Speaker playback"));
}

#[test]
fn validate_json_summary() {
    let output = conduit_bin()
        .arg("validate")
        .arg(topology("mixer.toml"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["pipelines"], 2);
    assert_eq!(summary["streams"], 2);
}

#[test]
fn validate_rejects_dangling_connection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[[component]]
id = 1
pipeline_id = 1
type = "host"

[[connection]]
source = 1
sink = 99
"#,
    )
    .unwrap();

    let output = conduit_bin().arg("validate").arg(&path).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("99"));
}

#[test]
fn validate_missing_file_fails() {
    let output = conduit_bin().args(["validate", "/nonexistent/topology.toml"]).output().unwrap();
    assert!(!output.status.success());
}

// ============================================================================
// `conduit run`
// ============================================================================

#[test]
fn run_playback_streams_cleanly() {
    let output = conduit_bin()
        .arg("run")
        .arg(topology("playback.toml"))
        .args(["--periods", "10", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["periods"], 10);
    let pipeline = &stats["pipelines"][0];
    assert_eq!(pipeline["host"], 10);
    assert_eq!(pipeline["direction"], "playback");
    assert_eq!(pipeline["xruns"], 0);
    assert!(pipeline["runs"].as_u64().unwrap() > 0);
    assert!(pipeline["host_bytes"].as_u64().unwrap() > 0);
}

#[test]
fn run_reports_xrun_on_dropped_period() {
    let output = conduit_bin()
        .arg("run")
        .arg(topology("playback.toml"))
        .args(["--periods", "10", "--drop", "4", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(stats["pipelines"][0]["xruns"].as_u64().unwrap() >= 1);
}

#[test]
fn run_text_output() {
    let output = conduit_bin()
        .arg("run")
        .arg(topology("playback.toml"))
        .args(["--periods", "5"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Ran 5 periods"));
    assert!(stdout.contains("ring of   10: fed"));
    assert!(stdout.contains("ring of   14: drained"));
}
