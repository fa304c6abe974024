//! Interactive session control.
//!
//! This module provides [`Session`] for spawning and driving one
//! interactive child process under a pseudo-terminal: writing input,
//! awaiting output patterns with a deadline, handing the terminal over to
//! the user, and tearing the process down. A background reader thread
//! accumulates the child's combined output into an [`OutputBuffer`]
//! (see [`crate::matcher`]) so output produced before an expect call is
//! still visible to it.
//!
//! # Lifecycle
//!
//! `Running -> Closing -> Closed`, with `Running -> Closed` directly when
//! the reader observes end-of-stream (the child exited on its own). Input
//! operations are only valid while `Running`; afterwards they fail with
//! [`Error::NoActiveSession`]. [`Session::close`] is idempotent and is
//! also performed best-effort on `Drop` so a panicking test cannot leak
//! the child past its lifetime.

mod registry;

pub use registry::SessionRegistry;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::matcher::{OutputBuffer, Pattern, WaitOutcome};

/// Default timeout for [`Session::expect`] when the caller gives none.
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Escape byte that ends an interact hand-off by default (Ctrl-]).
pub const DEFAULT_ESCAPE: u8 = 0x1d;

/// Grace period between SIGTERM and SIGKILL when closing a session.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Opaque identifier for one spawned session.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// The child is live and accepting input.
    Running,
    /// `close` is in progress.
    Closing,
    /// The child has exited or been torn down.
    Closed,
}

/// Configuration for spawning a session.
#[derive(Clone, Debug)]
pub struct SpawnConfig {
    /// Program to execute (resolved against PATH by the PTY layer).
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory; inherits the caller's when `None`.
    pub cwd: Option<PathBuf>,
    /// Exact environment for the child (curated by the caller; nothing
    /// else is inherited).
    pub env: BTreeMap<String, String>,
    /// Terminal rows.
    pub rows: u16,
    /// Terminal columns.
    pub cols: u16,
}

impl SpawnConfig {
    /// Configuration with the default 24x80 terminal and empty environment.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            rows: 24,
            cols: 80,
        }
    }
}

/// A successful expect: the matched region of output.
#[derive(Clone, Debug)]
pub struct ExpectMatch {
    /// The matched text (lossy UTF-8 of the matched bytes).
    pub text: String,
}

/// One spawned interactive child process.
pub struct Session {
    handle: SessionHandle,
    state: SessionState,
    command: String,
    buffer: OutputBuffer,
    consumed: usize,
    writer: Box<dyn Write + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
    _master: Box<dyn portable_pty::MasterPty + Send>,
    reader: Option<JoinHandle<()>>,
    reaped: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Spawn a child process under a fresh PTY and start accumulating its
    /// output.
    pub fn spawn(config: SpawnConfig) -> Result<Self> {
        let spawn_err = |err: &dyn fmt::Display| Error::Spawn {
            command: config.command.clone(),
            reason: err.to_string(),
        };

        let system = native_pty_system();
        let pair = system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| spawn_err(&err))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }
        cmd.env_clear();
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|err| spawn_err(&err))?;
        let mut pty_reader = pair
            .master
            .try_clone_reader()
            .map_err(|err| spawn_err(&err))?;
        let writer = pair.master.take_writer().map_err(|err| spawn_err(&err))?;

        let buffer = OutputBuffer::new();
        let sink = buffer.clone();
        let reader = std::thread::spawn(move || {
            let mut chunk = [0u8; 4096];
            loop {
                match pty_reader.read(&mut chunk) {
                    Ok(0) | Err(_) => {
                        sink.mark_eof();
                        break;
                    }
                    Ok(count) => {
                        if let Some(bytes) = chunk.get(..count) {
                            sink.append(bytes);
                        }
                    }
                }
            }
        });

        let handle = SessionHandle::new();
        tracing::debug!(%handle, command = %config.command, "spawned session");
        Ok(Self {
            handle,
            state: SessionState::Running,
            command: config.command,
            buffer,
            consumed: 0,
            writer,
            child,
            _master: pair.master,
            reader: Some(reader),
            reaped: false,
        })
    }

    /// The session's opaque handle.
    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether input operations are currently valid.
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    /// OS process id of the child, while the PTY layer still tracks it.
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Write `text` to the child's input, appending a newline unless
    /// suppressed.
    pub fn send(&mut self, text: &str, newline: bool) -> Result<()> {
        self.require_running("send")?;
        let write_err = |err: std::io::Error| Error::Write {
            reason: err.to_string(),
        };
        self.writer.write_all(text.as_bytes()).map_err(write_err)?;
        if newline {
            self.writer.write_all(b"\n").map_err(write_err)?;
        }
        self.writer.flush().map_err(write_err)?;
        Ok(())
    }

    /// Block until `pattern` appears in output produced since the last
    /// successful expect, or fail with [`Error::Timeout`] /
    /// [`Error::StreamClosed`].
    ///
    /// A match consumes output up through its end, so later expects only
    /// see newer output.
    pub fn expect(&mut self, pattern: &Pattern, timeout: Duration) -> Result<ExpectMatch> {
        self.require_running("expect")?;
        let deadline = Instant::now() + timeout;
        match self.buffer.wait_for_match(pattern, self.consumed, deadline) {
            WaitOutcome::Matched { start, end } => {
                let text = String::from_utf8_lossy(&self.buffer.slice(start, end)).into_owned();
                self.consumed = end;
                tracing::trace!(handle = %self.handle, pattern = pattern.as_str(), "expect matched");
                Ok(ExpectMatch { text })
            }
            WaitOutcome::TimedOut => Err(Error::Timeout {
                pattern: pattern.as_str().to_string(),
                waited: timeout,
                tail: self.buffer.tail_snippet(self.consumed),
            }),
            WaitOutcome::StreamClosed => {
                // Reader saw end-of-stream: the child exited on its own.
                self.state = SessionState::Closed;
                Err(Error::StreamClosed {
                    pattern: pattern.as_str().to_string(),
                    tail: self.buffer.tail_snippet(self.consumed),
                })
            }
        }
    }

    /// Hand the session over to `input`/`output` until `escape` is seen on
    /// input, input reaches end-of-stream, or the child exits.
    ///
    /// Output shown during the hand-off counts as consumed. The session
    /// stays running afterwards (unless the child itself exited).
    pub fn interact<R, W>(&mut self, input: R, mut output: W, escape: u8) -> Result<()>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        self.require_running("interact")?;
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        // The forwarder exits when input closes or the channel is dropped
        // on the next send after interact returns.
        std::thread::spawn(move || forward_input(input, &tx));

        loop {
            self.drain_output(&mut output)?;
            match rx.recv_timeout(Duration::from_millis(25)) {
                Ok(chunk) => {
                    if let Some(position) = chunk.iter().position(|byte| *byte == escape) {
                        self.write_raw(chunk.get(..position).unwrap_or_default())?;
                        self.drain_output(&mut output)?;
                        return Ok(());
                    }
                    self.write_raw(&chunk)?;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if self.buffer.is_eof() {
                        self.drain_output(&mut output)?;
                        self.state = SessionState::Closed;
                        return Ok(());
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.drain_output(&mut output)?;
                    return Ok(());
                }
            }
        }
    }

    /// Terminate the child if still running and release its resources.
    ///
    /// Idempotent: closing an already-closed session is a no-op, since
    /// cleanup paths call it unconditionally.
    pub fn close(&mut self) -> Result<()> {
        if self.reaped {
            self.state = SessionState::Closed;
            return Ok(());
        }
        self.state = SessionState::Closing;
        tracing::debug!(handle = %self.handle, "closing session");

        self.signal_group(TerminateSignal::Term)?;
        if self.wait_for_exit(CLOSE_GRACE)?.is_none() {
            self.signal_group(TerminateSignal::Kill)?;
            self.wait_for_exit(Duration::from_millis(200))?;
        }
        if let Some(reader) = self.reader.take() {
            // Reader unblocks once the child side of the PTY is gone.
            let _ = reader.join();
        }
        self.reaped = true;
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Poll for child exit up to `timeout`.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<Option<portable_pty::ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Ok(Some(status)),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(err) => return Err(Error::io("failed to wait for child", err)),
            }
        }
    }

    fn require_running(&self, operation: &str) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NoActiveSession {
                operation: operation.to_string(),
            })
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let write_err = |err: std::io::Error| Error::Write {
            reason: err.to_string(),
        };
        self.writer.write_all(bytes).map_err(write_err)?;
        self.writer.flush().map_err(write_err)?;
        Ok(())
    }

    fn drain_output<W: Write>(&mut self, output: &mut W) -> Result<()> {
        let available = self.buffer.len();
        if available > self.consumed {
            let bytes = self.buffer.slice(self.consumed, available);
            output
                .write_all(&bytes)
                .map_err(|err| Error::io("failed to write interact output", err))?;
            output
                .flush()
                .map_err(|err| Error::io("failed to flush interact output", err))?;
            self.consumed = available;
        }
        Ok(())
    }

    fn signal_group(&mut self, signal: TerminateSignal) -> Result<()> {
        #[cfg(unix)]
        if let Some(pid) = self.child.process_id() {
            let raw = i32::try_from(pid).map_err(|_| {
                Error::io(
                    "child pid out of range",
                    std::io::Error::from(std::io::ErrorKind::InvalidData),
                )
            })?;
            let sig = match signal {
                TerminateSignal::Term => Signal::SIGTERM,
                TerminateSignal::Kill => Signal::SIGKILL,
            };
            return match killpg(Pid::from_raw(raw), sig) {
                // ESRCH means the group is already gone, which is fine
                Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(err) => Err(Error::io(
                    "failed to signal process group",
                    std::io::Error::from_raw_os_error(err as i32),
                )),
            };
        }

        self.child
            .kill()
            .map_err(|err| Error::io("failed to kill child", err))
    }

    /// Best-effort cleanup for `Drop`; all errors ignored.
    fn cleanup_best_effort(&mut self) {
        if self.reaped {
            return;
        }
        let _ = self.signal_group(TerminateSignal::Term);
        let deadline = Instant::now() + Duration::from_millis(100);
        while Instant::now() < deadline {
            if self.child.try_wait().ok().flatten().is_some() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let _ = self.signal_group(TerminateSignal::Kill);
    }
}

#[derive(Clone, Copy)]
enum TerminateSignal {
    Term,
    Kill,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup_best_effort();
    }
}

fn forward_input<R: Read>(mut input: R, tx: &mpsc::Sender<Vec<u8>>) {
    let mut chunk = [0u8; 256];
    loop {
        match input.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(count) => {
                let Some(bytes) = chunk.get(..count) else {
                    break;
                };
                if tx.send(bytes.to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}
