// Test module - relaxed lint rules
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(missing_docs)]

//! Snapshot record/verify tests.

use std::collections::BTreeMap;

use scriptbox::commands;
use scriptbox::engine::{CmdOutput, CmdRegistry, ExecContext};
use scriptbox::snapshot::{snapshot_path, Snapshot};
use scriptbox::Error;

fn context_with(scratch: &tempfile::TempDir, update: bool) -> ExecContext {
    let mut env = BTreeMap::new();
    if update {
        env.insert("UPDATE_SNAPSHOTS".to_string(), "1".to_string());
    }
    let mut ctx = ExecContext::new(scratch.path(), env);
    ctx.set_snapshot_dir(scratch.path().join("__snapshots__"));
    ctx
}

fn output(stdout: &str, stderr: &str) -> CmdOutput {
    CmdOutput {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[test]
fn store_and_load_round_trip() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("nested").join("snap.json");
    let snapshot = Snapshot {
        stdout: "hello\n".to_string(),
        stderr: "warning: careful\n".to_string(),
    };
    snapshot.store(&path).unwrap();
    assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
}

#[test]
fn snapshot_files_are_json_objects_with_string_fields() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("snap.json");
    Snapshot {
        stdout: "out".to_string(),
        stderr: "err".to_string(),
    }
    .store(&path)
    .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["stdout"], "out");
    assert_eq!(raw["stderr"], "err");
}

#[test]
fn verify_passes_on_identical_output() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("snap.json");
    let snapshot = Snapshot {
        stdout: "same\n".to_string(),
        stderr: String::new(),
    };
    snapshot.store(&path).unwrap();
    assert!(snapshot.verify_against(&path).is_ok());
}

#[test]
fn verify_reports_a_line_diff_on_mismatch() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("snap.json");
    Snapshot {
        stdout: "expected line\n".to_string(),
        stderr: String::new(),
    }
    .store(&path)
    .unwrap();

    let actual = Snapshot {
        stdout: "actual line\n".to_string(),
        stderr: String::new(),
    };
    let err = actual.verify_against(&path).unwrap_err();
    match err {
        Error::SnapshotMismatch { detail, .. } => {
            assert!(detail.contains("expected line"), "detail: {detail}");
            assert!(detail.contains("actual line"), "detail: {detail}");
        }
        other => panic!("expected SnapshotMismatch, got {other:?}"),
    }
}

#[test]
fn verify_against_a_missing_file_is_its_own_error() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("never-recorded.json");
    let err = Snapshot::default().verify_against(&path).unwrap_err();
    assert!(matches!(err, Error::SnapshotMissing { .. }), "got {err:?}");
}

// =============================================================================
// The `snapshot` command
// =============================================================================

#[test]
fn snapshot_command_records_in_update_mode() {
    let mut registry = CmdRegistry::new();
    commands::register_snapshot(&mut registry).unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut ctx = context_with(&scratch, true);

    ctx.record_output(output("captured stdout\n", ""));
    registry
        .get("snapshot")
        .unwrap()
        .run(&mut ctx, &["greeting".to_string()])
        .unwrap();

    let recorded = Snapshot::load(&snapshot_path(&ctx, "greeting")).unwrap();
    assert_eq!(recorded.stdout, "captured stdout\n");
}

#[test]
fn snapshot_command_verifies_in_normal_mode() {
    let mut registry = CmdRegistry::new();
    commands::register_snapshot(&mut registry).unwrap();
    let scratch = tempfile::tempdir().unwrap();

    // Record first.
    let mut ctx = context_with(&scratch, true);
    ctx.record_output(output("stable\n", ""));
    registry
        .get("snapshot")
        .unwrap()
        .run(&mut ctx, &["stable".to_string()])
        .unwrap();
    drop(ctx);

    // Matching output verifies.
    let mut ctx = context_with(&scratch, false);
    ctx.record_output(output("stable\n", ""));
    assert!(registry
        .get("snapshot")
        .unwrap()
        .run(&mut ctx, &["stable".to_string()])
        .is_ok());

    // Diverging output fails.
    ctx.record_output(output("changed\n", ""));
    let err = registry
        .get("snapshot")
        .unwrap()
        .run(&mut ctx, &["stable".to_string()])
        .unwrap_err();
    assert!(matches!(err, Error::SnapshotMismatch { .. }), "got {err:?}");
}

#[test]
fn snapshot_command_requires_a_name() {
    let mut registry = CmdRegistry::new();
    commands::register_snapshot(&mut registry).unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let mut ctx = context_with(&scratch, false);

    let err = registry
        .get("snapshot")
        .unwrap()
        .run(&mut ctx, &[])
        .unwrap_err();
    assert!(matches!(err, Error::Usage { .. }), "got {err:?}");
}
