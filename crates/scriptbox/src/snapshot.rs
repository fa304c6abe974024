//! Output snapshotting.
//!
//! A snapshot is a JSON object with the captured standard-output and
//! standard-error text of a command. Recording writes the file; verifying
//! compares against it and fails with a line-oriented diff on mismatch.
//! The execution context's update flag (`UPDATE_SNAPSHOTS=1`) switches
//! between the two.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{CmdOutput, CmdUsage, ExecContext, ScriptCmd};
use crate::error::{Error, Result};

/// Captured command output, as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl Snapshot {
    /// Build a snapshot from a command's reported output.
    pub fn from_output(output: &CmdOutput) -> Self {
        Self {
            stdout: output.stdout.clone(),
            stderr: output.stderr.clone(),
        }
    }

    /// Read a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::SnapshotMissing {
                    path: path.to_path_buf(),
                }
            } else {
                Error::io(format!("failed to read snapshot {}", path.display()), err)
            }
        })?;
        serde_json::from_str(&data).map_err(|err| {
            Error::io(
                format!("failed to parse snapshot {}", path.display()),
                err.into(),
            )
        })
    }

    /// Write the snapshot as pretty JSON, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| Error::io("failed to create snapshot directory", err))?;
        }
        let data = serde_json::to_vec_pretty(self)
            .map_err(|err| Error::io("failed to encode snapshot", err.into()))?;
        fs::write(path, data)
            .map_err(|err| Error::io(format!("failed to write snapshot {}", path.display()), err))
    }

    /// Compare against the recorded file at `path`.
    pub fn verify_against(&self, path: &Path) -> Result<()> {
        let recorded = Self::load(path)?;
        if recorded == *self {
            return Ok(());
        }
        let mut detail = String::new();
        if recorded.stdout != self.stdout {
            let _ = write!(detail, "{}", diff_lines("stdout", &recorded.stdout, &self.stdout));
        }
        if recorded.stderr != self.stderr {
            let _ = write!(detail, "{}", diff_lines("stderr", &recorded.stderr, &self.stderr));
        }
        Err(Error::SnapshotMismatch {
            path: path.to_path_buf(),
            detail,
        })
    }
}

/// Line-oriented difference between recorded and actual text.
fn diff_lines(stream: &str, recorded: &str, actual: &str) -> String {
    let mut out = format!("--- {stream} ---\n");
    let mut recorded_lines = recorded.lines();
    let mut actual_lines = actual.lines();
    let mut line = 0usize;
    loop {
        line += 1;
        match (recorded_lines.next(), actual_lines.next()) {
            (None, None) => break,
            (want, got) if want == got => {}
            (want, got) => {
                let _ = writeln!(out, "line {line}:");
                let _ = writeln!(out, "  recorded: {}", want.unwrap_or("<end of output>"));
                let _ = writeln!(out, "  actual:   {}", got.unwrap_or("<end of output>"));
            }
        }
    }
    out
}

/// Resolve the snapshot file for `name` within a context.
pub fn snapshot_path(ctx: &ExecContext, name: &str) -> PathBuf {
    ctx.snapshot_dir().join(format!("{name}.json"))
}

/// Record or verify the context's most recent command output under `name`.
pub fn record_or_verify(ctx: &mut ExecContext, name: &str) -> Result<CmdOutput> {
    let output = ctx.last_output().cloned().unwrap_or_default();
    let snapshot = Snapshot::from_output(&output);
    let path = snapshot_path(ctx, name);
    if ctx.update_snapshots() {
        snapshot.store(&path)?;
        tracing::debug!(path = %path.display(), "snapshot recorded");
    } else {
        snapshot.verify_against(&path)?;
    }
    Ok(CmdOutput::default())
}

/// `snapshot NAME` — record or verify the previous command's output.
pub struct SnapshotCmd;

impl ScriptCmd for SnapshotCmd {
    fn usage(&self) -> CmdUsage {
        CmdUsage {
            summary: "Record or verify command output",
            args: "name",
            detail: &[
                "snapshot captures the output of the most recent command. With \
                 UPDATE_SNAPSHOTS=1 the captured output is written to \
                 <snapshot_dir>/<name>.json; otherwise it is compared against the \
                 recorded file and the step fails on any difference.",
            ],
        }
    }

    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput> {
        let Some(name) = args.first() else {
            return Err(Error::Usage {
                command: "snapshot".to_string(),
                usage: self.usage().args.to_string(),
                reason: "a snapshot name is required".to_string(),
            });
        };
        record_or_verify(ctx, name)
    }
}
