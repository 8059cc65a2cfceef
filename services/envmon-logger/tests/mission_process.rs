//! Runs the real mission binary against a scratch directory.

use std::process::{Command, Stdio};

use serde_json::Value;

const MISSION: &str = "20240101_000000_cafef00d";

#[test]
fn json_log_format_applies_to_mission_process() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("state.json");

    let child = Command::new(env!("CARGO_BIN_EXE_envmon-logger"))
        .args(["--mission-id", MISSION, "--location-mode", "fixed", "--duration", "1"])
        .env_remove("ENVMON_CONFIG")
        .env_remove("RUST_LOG")
        .env("ENVMON_LOG_FORMAT", "json")
        .env("ENVMON_STATE_FILE", &state_file)
        .env("ENVMON_MISSIONS_DIR", dir.path().join("missions"))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let pid = child.id();
    let output = child.wait_with_output().unwrap();

    // Fixed location without coordinates fails preflight.
    assert_eq!(output.status.code(), Some(2));

    let stderr = String::from_utf8(output.stderr).unwrap();
    let events: Vec<Value> = stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap_or_else(|e| panic!("{e}: {line}")))
        .collect();
    let starting = events
        .iter()
        .find(|event| event["message"] == "Mission process starting")
        .expect("startup event missing");
    assert_eq!(starting["mission_id"], MISSION);
    assert_eq!(starting["pid"], pid);

    let state: Value = serde_json::from_slice(&std::fs::read(&state_file).unwrap()).unwrap();
    assert_eq!(state["state"], "ERROR");
    assert_eq!(state["pid"], pid);
}
