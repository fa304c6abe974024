//! Asciicast conversion, recording, and playback.
//!
//! Recording and playback delegate to the external `asciinema` binary.
//! Conversion writes asciicast v2 directly: a JSON header line followed
//! by one `[time, "o", data]` JSON array per output event.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// Asciicast v2 header line.
#[derive(Clone, Debug, Serialize)]
pub struct CastHeader {
    /// Format version, always 2.
    pub version: u32,
    /// Terminal width in columns.
    pub width: u16,
    /// Terminal height in rows.
    pub height: u16,
    /// Unix timestamp of the recording.
    pub timestamp: u64,
    /// Recording title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl CastHeader {
    /// Header with the conventional 80x25 geometry and the current time.
    pub fn new(title: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Self {
            version: 2,
            width: 80,
            height: 25,
            timestamp,
            title: Some(title.into()),
        }
    }
}

/// One output event: seconds since start, and the emitted text.
#[derive(Clone, Debug)]
pub struct CastEvent {
    /// Event time in seconds.
    pub time: f64,
    /// Output data.
    pub data: String,
}

/// Write a cast: header line, then one event line each.
pub fn write_cast<W: Write>(mut out: W, header: &CastHeader, events: &[CastEvent]) -> Result<()> {
    let encode = |err: serde_json::Error| Error::io("failed to encode cast", err.into());
    let header_line = serde_json::to_string(header).map_err(encode)?;
    writeln!(out, "{header_line}").map_err(|err| Error::io("failed to write cast", err))?;
    for event in events {
        let line =
            serde_json::to_string(&(event.time, "o", &event.data)).map_err(encode)?;
        writeln!(out, "{line}").map_err(|err| Error::io("failed to write cast", err))?;
    }
    Ok(())
}

/// Convert a snapshot file into an asciicast, stderr rendered in red.
pub fn convert_snapshot(snapshot_path: &Path, output_path: &Path) -> Result<()> {
    let snapshot = Snapshot::load(snapshot_path)?;
    let title = snapshot_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "snapshot".to_string());

    let mut events = Vec::new();
    if !snapshot.stdout.is_empty() {
        events.push(CastEvent {
            time: 0.1,
            data: snapshot.stdout.clone(),
        });
    }
    if !snapshot.stderr.is_empty() {
        events.push(CastEvent {
            time: 0.2,
            data: format!("\u{1b}[31m{}\u{1b}[0m", snapshot.stderr),
        });
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io("failed to create cast directory", err))?;
    }
    let file = fs::File::create(output_path)
        .map_err(|err| Error::io("failed to create cast file", err))?;
    write_cast(file, &CastHeader::new(title), &events)
}

/// Record a command's execution with `asciinema rec`.
pub fn record(output: &Path, command_line: &str) -> Result<()> {
    require_tool("asciinema")?;
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| Error::io("failed to create recording directory", err))?;
    }
    let status = Command::new("asciinema")
        .arg("rec")
        .arg("--overwrite")
        .arg("--command")
        .arg(command_line)
        .arg(output)
        .status()
        .map_err(|err| Error::tool("asciinema", err.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::tool("asciinema", format!("recording exited with {status}")))
    }
}

/// Play a cast with `asciinema play`.
pub fn play(cast: &Path) -> Result<()> {
    require_tool("asciinema")?;
    let status = Command::new("asciinema")
        .arg("play")
        .arg(cast)
        .status()
        .map_err(|err| Error::tool("asciinema", err.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::tool("asciinema", format!("playback exited with {status}")))
    }
}

/// Resolve a program on PATH, with an installation hint when absent.
pub fn require_tool(program: &str) -> Result<PathBuf> {
    let path = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::tool(
        program,
        format!("'{program}' not found on PATH; install it to use this command"),
    ))
}
