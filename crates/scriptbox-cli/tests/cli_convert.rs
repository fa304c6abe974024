// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(missing_docs)]

//! `convert-cast` subcommand tests.

use std::process::Command;

fn scriptbox() -> Command {
    Command::new(env!("CARGO_BIN_EXE_scriptbox"))
}

#[test]
fn convert_cast_writes_a_playable_file() {
    let scratch = tempfile::tempdir().unwrap();
    let snapshot = scratch.path().join("build.json");
    std::fs::write(
        &snapshot,
        serde_json::json!({
            "stdout": "compiling...\nfinished\n",
            "stderr": "warning: unused import\n"
        })
        .to_string(),
    )
    .unwrap();

    let cast = scratch.path().join("build.cast");
    let output = scriptbox()
        .args(["convert-cast"])
        .arg(&snapshot)
        .arg(&cast)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "convert-cast failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let text = std::fs::read_to_string(&cast).unwrap();
    let mut lines = text.lines();
    let header: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
    assert_eq!(header["version"], 2);
    // One stdout event and one stderr event.
    assert_eq!(lines.count(), 2);
}

#[test]
fn convert_cast_rejects_a_missing_snapshot() {
    let scratch = tempfile::tempdir().unwrap();
    let output = scriptbox()
        .args(["convert-cast"])
        .arg(scratch.path().join("missing.json"))
        .arg(scratch.path().join("out.cast"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn convert_cast_rejects_malformed_json() {
    let scratch = tempfile::tempdir().unwrap();
    let snapshot = scratch.path().join("broken.json");
    std::fs::write(&snapshot, "not json at all").unwrap();

    let output = scriptbox()
        .args(["convert-cast"])
        .arg(&snapshot)
        .arg(scratch.path().join("out.cast"))
        .output()
        .unwrap();
    assert!(!output.status.success());
}
