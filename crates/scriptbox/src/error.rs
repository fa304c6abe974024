//! Error taxonomy for the harness.
//!
//! Every failure a script step can hit maps to one variant here, so the
//! engine can report it as a failed step with an actionable message.
//! `Timeout` and `StreamClosed` are deliberately distinct: the first means
//! the child is still running but never produced the pattern, the second
//! means the child ended before the pattern appeared.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Harness error taxonomy.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    /// The child process could not be started.
    #[error("failed to spawn '{command}': {reason}")]
    #[diagnostic(code(scriptbox::session::spawn))]
    Spawn {
        /// Command line that failed to start.
        command: String,
        /// Underlying failure rendered as text.
        reason: String,
    },

    /// An operation was issued without a live session.
    #[error("no active session for '{operation}' (use expect:spawn first)")]
    #[diagnostic(code(scriptbox::session::no_active_session))]
    NoActiveSession {
        /// The operation that was attempted.
        operation: String,
    },

    /// Writing to the child's input stream failed.
    #[error("failed to write to session input: {reason}")]
    #[diagnostic(
        code(scriptbox::session::write),
        help("a broken input stream usually means the process already exited")
    )]
    Write {
        /// Underlying failure rendered as text.
        reason: String,
    },

    /// The pattern was not observed before the deadline.
    #[error("timed out after {waited:?} waiting for {pattern:?}; unmatched output: {tail:?}")]
    #[diagnostic(code(scriptbox::expect::timeout))]
    Timeout {
        /// Pattern that never appeared.
        pattern: String,
        /// How long the expect waited.
        waited: Duration,
        /// Snippet of output seen since the last successful match.
        tail: String,
    },

    /// The child's output stream closed before the pattern appeared.
    #[error("process ended before {pattern:?} was seen; unmatched output: {tail:?}")]
    #[diagnostic(code(scriptbox::expect::stream_closed))]
    StreamClosed {
        /// Pattern that never appeared.
        pattern: String,
        /// Snippet of output seen since the last successful match.
        tail: String,
    },

    /// A pattern argument could not be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    #[diagnostic(code(scriptbox::expect::pattern))]
    Pattern {
        /// The offending pattern text.
        pattern: String,
        /// Compilation failure rendered as text.
        reason: String,
    },

    /// A script command was invoked with bad arguments.
    #[error("usage: {command} {usage}: {reason}")]
    #[diagnostic(code(scriptbox::engine::usage))]
    Usage {
        /// Command name as registered.
        command: String,
        /// Argument pattern from the command's usage.
        usage: String,
        /// What was wrong with the invocation.
        reason: String,
    },

    /// A command registration collided with an existing or reserved name.
    #[error("command name '{name}' collides with an engine built-in or an existing registration")]
    #[diagnostic(code(scriptbox::engine::collision))]
    CommandCollision {
        /// The colliding name.
        name: String,
    },

    /// Snapshot content did not match the recorded file.
    #[error("snapshot mismatch for {path}:\n{detail}")]
    #[diagnostic(
        code(scriptbox::snapshot::mismatch),
        help("re-run with UPDATE_SNAPSHOTS=1 to accept the new output")
    )]
    SnapshotMismatch {
        /// Snapshot file that was compared.
        path: PathBuf,
        /// Line-oriented description of the difference.
        detail: String,
    },

    /// A snapshot file was expected but not found.
    #[error("missing snapshot {path} (run with UPDATE_SNAPSHOTS=1 to record it)")]
    #[diagnostic(code(scriptbox::snapshot::missing))]
    SnapshotMissing {
        /// Snapshot file that was looked up.
        path: PathBuf,
    },

    /// An external tool (docker, asciinema, the query tool) failed or is absent.
    #[error("external tool '{program}' failed: {reason}")]
    #[diagnostic(code(scriptbox::tool))]
    Tool {
        /// Program that was invoked or looked up.
        program: String,
        /// Failure description, including captured stderr when available.
        reason: String,
    },

    /// The external script engine reported a script failure.
    #[error("script {script} failed: {reason}")]
    #[diagnostic(code(scriptbox::engine::script))]
    Script {
        /// Script file that failed.
        script: PathBuf,
        /// Engine-reported failure.
        reason: String,
    },

    /// An I/O operation outside the session streams failed.
    #[error("{context}")]
    #[diagnostic(code(scriptbox::io))]
    Io {
        /// What the harness was doing.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with a short description of the failed operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Build a `Tool` error from a program name and captured output.
    pub fn tool(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            program: program.into(),
            reason: reason.into(),
        }
    }
}
