//! Bridge between script files and the host test runner.
//!
//! [`Runner`] discovers test scripts, gives each one a fresh scratch
//! directory and a curated environment, assembles the command registry,
//! and hands execution to the external engine. Cleanup — sessions closed,
//! scratch directory removed — happens on every path, pass or fail.
//!
//! Reporting goes through the minimal [`TestSink`] interface so the host
//! framework (or anything else) can observe per-script results without
//! the harness depending on it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::commands;
use crate::docker;
use crate::engine::{CmdRegistry, ExecContext, ScriptEngine};
use crate::error::{Error, Result};

/// Environment variables passed through to test processes. Everything
/// else must come in via [`Options::env`], keeping runs reproducible.
pub const ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "TMPDIR"];

/// Hook for callers to extend the command registry before a run.
pub type SetupHook = Arc<dyn Fn(&mut CmdRegistry) -> Result<()> + Send + Sync>;

/// Configuration for a harness run.
#[derive(Clone)]
pub struct Options {
    /// Glob for test files, `dir/*.suffix` form.
    pub pattern: String,
    /// Run the suite inside a Docker container instead of locally.
    pub use_docker: bool,
    /// Base image when no Dockerfile is embedded in a test file.
    pub docker_image: String,
    /// Re-record snapshots instead of verifying them.
    pub update_snapshots: bool,
    /// Chattier sink output.
    pub verbose: bool,
    /// Extra environment variables for test processes.
    pub env: BTreeMap<String, String>,
    /// Snapshot directory, resolved against the invoking directory when
    /// relative so snapshots persist across runs.
    pub snapshot_dir: PathBuf,
    /// Host framework deadline for each script, when it has one.
    pub deadline: Option<Duration>,
    /// Registry extension hook.
    pub setup: Option<SetupHook>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            pattern: "testdata/*.txt".to_string(),
            use_docker: false,
            docker_image: "rust:latest".to_string(),
            update_snapshots: false,
            verbose: false,
            env: BTreeMap::new(),
            snapshot_dir: PathBuf::from("testdata/__snapshots__"),
            deadline: None,
            setup: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("pattern", &self.pattern)
            .field("use_docker", &self.use_docker)
            .field("docker_image", &self.docker_image)
            .field("update_snapshots", &self.update_snapshots)
            .field("verbose", &self.verbose)
            .field("env", &self.env)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("deadline", &self.deadline)
            .field("setup", &self.setup.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

/// Minimal reporting interface onto the host test framework.
pub trait TestSink {
    /// A script is about to run.
    fn start(&mut self, name: &str);
    /// The script passed.
    fn pass(&mut self, name: &str);
    /// The script failed with `message`.
    fn fail(&mut self, name: &str, message: &str);
}

/// Sink that reports through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl TestSink for LogSink {
    fn start(&mut self, name: &str) {
        tracing::debug!(script = name, "running");
    }

    fn pass(&mut self, name: &str) {
        tracing::info!(script = name, "passed");
    }

    fn fail(&mut self, name: &str, message: &str) {
        tracing::error!(script = name, %message, "failed");
    }
}

/// Outcome of a harness run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Scripts executed.
    pub total: usize,
    /// Scripts that passed.
    pub passed: usize,
    /// Failed scripts with their failure messages.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// Whether every script passed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs script files through an external engine.
#[derive(Debug)]
pub struct Runner {
    options: Options,
}

impl Runner {
    /// Runner with the given options.
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// The runner's options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Execute every script matching the pattern, reporting through
    /// `sink`. Discovery failures (including an empty match set) are
    /// errors; per-script failures land in the summary.
    pub fn run(&self, engine: &dyn ScriptEngine, sink: &mut dyn TestSink) -> Result<RunSummary> {
        if self.options.use_docker {
            return self.run_in_docker(sink);
        }
        let scripts = discover(&self.options.pattern)?;
        let mut summary = RunSummary::default();
        for script in scripts {
            let name = script_name(&script);
            summary.total += 1;
            sink.start(&name);
            match self.run_script(engine, &script) {
                Ok(()) => {
                    summary.passed += 1;
                    sink.pass(&name);
                }
                Err(err) => {
                    sink.fail(&name, &err.to_string());
                    summary.failed.push((name, err.to_string()));
                }
            }
        }
        Ok(summary)
    }

    /// Execute a single script in a fresh execution context.
    pub fn run_script(&self, engine: &dyn ScriptEngine, script: &Path) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix("scriptbox-")
            .tempdir()
            .map_err(|err| Error::io("failed to create scratch directory", err))?;
        let testdata = scratch.path().join("testdata");
        std::fs::create_dir_all(&testdata)
            .map_err(|err| Error::io("failed to create testdata directory", err))?;
        let staged = testdata.join(script_name(script));
        std::fs::copy(script, &staged).map_err(|err| {
            Error::io(format!("failed to stage script {}", script.display()), err)
        })?;

        let mut ctx = ExecContext::new(scratch.path(), self.curated_env());
        ctx.set_snapshot_dir(self.resolved_snapshot_dir()?);
        if let Some(deadline) = self.options.deadline {
            ctx.set_deadline(Instant::now() + deadline);
        }
        let registry = self.base_registry()?;

        let result = engine.execute(&mut ctx, &registry, &staged);
        // Teardown is unconditional: sessions first, then the scratch
        // directory when `scratch` drops.
        ctx.finish();
        result
    }

    /// The command registry for a run: the expect and snapshot sets plus
    /// the caller's setup hook.
    pub fn base_registry(&self) -> Result<CmdRegistry> {
        let mut registry = CmdRegistry::new();
        commands::register_all(&mut registry)?;
        if let Some(setup) = &self.options.setup {
            setup(&mut registry)?;
        }
        Ok(registry)
    }

    fn curated_env(&self) -> BTreeMap<String, String> {
        let mut env = curated_env(&self.options.env);
        if self.options.update_snapshots {
            env.insert("UPDATE_SNAPSHOTS".to_string(), "1".to_string());
        }
        env
    }

    fn resolved_snapshot_dir(&self) -> Result<PathBuf> {
        if self.options.snapshot_dir.is_absolute() {
            return Ok(self.options.snapshot_dir.clone());
        }
        let base = std::env::current_dir()
            .map_err(|err| Error::io("failed to resolve current directory", err))?;
        Ok(base.join(&self.options.snapshot_dir))
    }

    fn run_in_docker(&self, sink: &mut dyn TestSink) -> Result<RunSummary> {
        let scripts = discover(&self.options.pattern)?;
        let name = "docker-suite";
        sink.start(name);
        let config = docker::SuiteConfig {
            scripts,
            image: self.options.docker_image.clone(),
            update_snapshots: self.options.update_snapshots,
            verbose: self.options.verbose,
        };
        let mut summary = RunSummary { total: 1, ..RunSummary::default() };
        match docker::run_suite(&config) {
            Ok(()) => {
                summary.passed = 1;
                sink.pass(name);
            }
            Err(err) => {
                sink.fail(name, &err.to_string());
                summary.failed.push((name.to_string(), err.to_string()));
            }
        }
        Ok(summary)
    }
}

/// Build the curated environment: the allow-list from the real
/// environment plus caller-supplied overrides.
pub fn curated_env(overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for key in ENV_ALLOWLIST {
        if let Ok(value) = std::env::var(key) {
            env.insert((*key).to_string(), value);
        }
    }
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    env
}

/// Find test files for a `dir/*.suffix` pattern (or a literal path).
/// Matching nothing is an error so a typo'd pattern cannot silently pass.
pub fn discover(pattern: &str) -> Result<Vec<PathBuf>> {
    let not_found = || {
        Error::io(
            format!("no files match pattern '{pattern}'"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        )
    };

    if !pattern.contains('*') {
        let path = PathBuf::from(pattern);
        return if path.is_file() {
            Ok(vec![path])
        } else {
            Err(not_found())
        };
    }

    let (dir, file_pattern) = match pattern.rsplit_once('/') {
        Some((dir, rest)) => (PathBuf::from(dir), rest),
        None => (PathBuf::from("."), pattern),
    };
    let Some((prefix, suffix)) = file_pattern.split_once('*') else {
        return Err(not_found());
    };
    if suffix.contains('*') {
        return Err(Error::io(
            format!("pattern '{pattern}' has more than one wildcard"),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        ));
    }

    let entries = std::fs::read_dir(&dir)
        .map_err(|err| Error::io(format!("failed to read {}", dir.display()), err))?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| {
                        name.len() >= prefix.len() + suffix.len()
                            && name.starts_with(prefix)
                            && name.ends_with(suffix)
                    })
        })
        .collect();
    matches.sort();
    if matches.is_empty() {
        return Err(not_found());
    }
    Ok(matches)
}

fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}
