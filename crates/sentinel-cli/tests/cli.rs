//! End-to-end runs of the `sentinel` binary.

use std::process::Command;

fn sentinel() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sentinel"));
    cmd.env_remove("SENTINEL_LOG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn catalog_json_lists_every_type() {
    let out = sentinel().args(["catalog", "--json"]).output().unwrap();
    assert!(out.status.success());
    let entries: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 12);
    assert!(entries
        .iter()
        .any(|e| e["violation"] == "audio_anomaly" && e["severity"] == "high"));
    assert!(entries
        .iter()
        .any(|e| e["violation"] == "identity_verification_failed" && e["severity"] == "critical"));
}

#[test]
fn detect_prints_violations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("judgment.json");
    std::fs::write(&path, r#"{"faces": 0, "flags": []}"#).unwrap();

    let out = sentinel().arg("detect").arg(&path).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("no_face_detected (critical)"));
}

#[test]
fn detect_flags_spoofed_face() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("verdict.json");
    std::fs::write(&path, r#"{"faces_detected": 1, "presentation_attack": true}"#).unwrap();

    let out = sentinel().arg("detect").arg(&path).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("identity_verification_failed (critical)"));
}

#[test]
fn detect_fails_on_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("judgment.json");
    std::fs::write(&path, "not json at all").unwrap();

    let out = sentinel().arg("detect").arg(&path).output().unwrap();
    assert!(!out.status.success());
}

#[test]
fn simulate_reports_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.json");
    std::fs::write(
        &path,
        r#"{
            "session_id": "cli-sim",
            "steps": [
                {"outcome": {"judgment": {"faces": 1, "flags": []}}},
                {"outcome": "unavailable"},
                {"outcome": {"judgment": {"faces": 2, "flags": []}}}
            ]
        }"#,
    )
    .unwrap();

    let out = sentinel()
        .args(["simulate", "--quiet", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["session_id"], "cli-sim");
    assert_eq!(summary["final_status"], "terminated");
}
