//! Boundary to the external command-script engine.
//!
//! The engine itself — parsing test files, built-in commands, output
//! assertions, condition evaluation — is an external collaborator. This
//! module defines the surface it consumes: the command trait and registry
//! the harness merges custom commands into, the per-test execution
//! context those commands run against, and the [`ScriptEngine`] trait the
//! harness calls to execute one script file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::session::SessionRegistry;

/// Engine built-ins custom commands must not shadow.
pub const RESERVED_COMMANDS: &[&str] = &[
    "cat", "cd", "chmod", "cmp", "cp", "echo", "env", "exec", "exists", "grep", "help", "mkdir",
    "mv", "rm", "skip", "sleep", "status", "stderr", "stdout", "stop", "symlink", "wait",
];

/// Usage metadata for a registered command, rendered by the engine's help.
#[derive(Clone, Copy, Debug)]
pub struct CmdUsage {
    /// One-line summary.
    pub summary: &'static str,
    /// Argument pattern, e.g. `"PATTERN [TIMEOUT_SECONDS]"`.
    pub args: &'static str,
    /// Longer description, one paragraph per entry.
    pub detail: &'static [&'static str],
}

/// What a completed command reports back to the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdOutput {
    /// Captured standard output text.
    pub stdout: String,
    /// Captured standard error text.
    pub stderr: String,
}

impl CmdOutput {
    /// Output with only a stdout payload.
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stdout: text.into(),
            stderr: String::new(),
        }
    }
}

/// A named operation callable from a test script.
///
/// The engine's execution model is "run to completion, then report
/// output or error", which maps directly onto the blocking calls here.
pub trait ScriptCmd: Send + Sync {
    /// Usage metadata for help and error messages.
    fn usage(&self) -> CmdUsage;

    /// Execute with the script's ordered string arguments.
    fn run(&self, ctx: &mut ExecContext, args: &[String]) -> Result<CmdOutput>;
}

/// Name-to-command map the engine merges into its built-in set.
#[derive(Clone, Default)]
pub struct CmdRegistry {
    cmds: BTreeMap<String, Arc<dyn ScriptCmd>>,
}

impl std::fmt::Debug for CmdRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmdRegistry")
            .field("names", &self.cmds.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CmdRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, refusing collisions with engine built-ins and
    /// earlier registrations.
    pub fn register(&mut self, name: impl Into<String>, cmd: Arc<dyn ScriptCmd>) -> Result<()> {
        let name = name.into();
        if RESERVED_COMMANDS.contains(&name.as_str()) || self.cmds.contains_key(&name) {
            return Err(Error::CommandCollision { name });
        }
        self.cmds.insert(name, cmd);
        Ok(())
    }

    /// Look up a registered command.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ScriptCmd>> {
        self.cmds.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cmds.keys().map(String::as_str)
    }
}

/// A named condition test files can gate commands on (`[unix] cmd ...`).
#[derive(Clone, Copy, Debug)]
pub struct Condition {
    /// Condition name as used in scripts.
    pub name: &'static str,
    /// Human-readable summary.
    pub summary: &'static str,
    /// Evaluated once per run by the engine.
    pub eval: fn() -> bool,
}

/// Platform conditions merged into the engine's condition set.
pub fn platform_conditions() -> Vec<Condition> {
    vec![
        Condition {
            name: "unix",
            summary: "unix system",
            eval: || cfg!(unix),
        },
        Condition {
            name: "windows",
            summary: "windows system",
            eval: || cfg!(windows),
        },
        Condition {
            name: "linux",
            summary: "linux system",
            eval: || cfg!(target_os = "linux"),
        },
        Condition {
            name: "macos",
            summary: "darwin system",
            eval: || cfg!(target_os = "macos"),
        },
    ]
}

/// Per-test execution context.
///
/// One context exists per script run: its scratch directory, its curated
/// environment, its session registry, and its deadline are all private to
/// that run, so parallel test files cannot interfere with each other.
/// Finishing (or dropping) a context closes any session it still owns.
#[derive(Debug)]
pub struct ExecContext {
    work_dir: PathBuf,
    env: BTreeMap<String, String>,
    sessions: SessionRegistry,
    deadline: Option<Instant>,
    snapshot_dir: PathBuf,
    update_snapshots: bool,
    last_output: Option<CmdOutput>,
}

impl ExecContext {
    /// Context rooted at `work_dir` with the given curated environment.
    pub fn new(work_dir: impl Into<PathBuf>, env: BTreeMap<String, String>) -> Self {
        let work_dir = work_dir.into();
        let update_snapshots = env
            .get("UPDATE_SNAPSHOTS")
            .is_some_and(|value| value.as_str() == "1");
        Self {
            snapshot_dir: work_dir.join("testdata").join("__snapshots__"),
            work_dir,
            env,
            sessions: SessionRegistry::new(),
            deadline: None,
            update_snapshots,
            last_output: None,
        }
    }

    /// The run's scratch directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// The curated environment handed to spawned processes.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Look up one environment variable.
    pub fn getenv(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Set one environment variable for subsequently spawned processes.
    pub fn setenv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    /// The run's session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Mutable access to the run's session registry.
    pub fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }

    /// Impose the host framework's deadline on this run.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Clamp a per-operation timeout so the run cannot outlive the host
    /// framework's deadline; whichever is shorter governs.
    pub fn clamp_timeout(&self, timeout: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        }
    }

    /// Where snapshot files live for this run.
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Override the snapshot directory.
    pub fn set_snapshot_dir(&mut self, dir: impl Into<PathBuf>) {
        self.snapshot_dir = dir.into();
    }

    /// Whether snapshots are being re-recorded rather than verified.
    pub fn update_snapshots(&self) -> bool {
        self.update_snapshots
    }

    /// Record the output of the command that just completed; the engine
    /// calls this after every step so `snapshot` can capture it.
    pub fn record_output(&mut self, output: CmdOutput) {
        self.last_output = Some(output);
    }

    /// Output of the most recent command, if any.
    pub fn last_output(&self) -> Option<&CmdOutput> {
        self.last_output.as_ref()
    }

    /// Tear down everything the run still owns. Runs on every path,
    /// pass or fail; also invoked by `Drop`.
    pub fn finish(&mut self) {
        self.sessions.close_all();
    }
}

impl Drop for ExecContext {
    fn drop(&mut self) {
        self.finish();
    }
}

/// How the harness invokes the external engine on one test file.
pub trait ScriptEngine {
    /// Parse and execute `script` against `ctx`, resolving custom command
    /// names through `registry`. A failing script step surfaces as
    /// [`Error::Script`].
    fn execute(&self, ctx: &mut ExecContext, registry: &CmdRegistry, script: &Path)
        -> Result<()>;
}
