//! Scriptbox CLI: run script tests, manage snapshots and recordings.
//!
//! `scriptbox test` prepares the suite and delegates execution to the
//! project's own test build; the remaining subcommands wrap snapshots,
//! asciicast recordings, and AI-assisted scaffolding.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use std::path::{Path, PathBuf};
use std::process::Command;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use miette::Result;
use scriptbox::docker;
use scriptbox::harness;
use scriptbox::recording;
use scriptbox::scaffold::{self, QueryTool};
use scriptbox::Error;

#[derive(Debug, Parser)]
#[command(name = "scriptbox", version, about = "Script-driven CLI test harness")]
struct Cli {
    /// Show debug-level progress on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run script tests matching a pattern
    Test {
        /// Test file pattern, e.g. `testdata/*.txt`
        pattern: Option<String>,
        /// Run the suite inside a Docker container
        #[arg(long)]
        docker: bool,
        /// Docker base image when no Dockerfile is embedded
        #[arg(long)]
        docker_image: Option<String>,
        /// Re-record snapshots instead of verifying them
        #[arg(long)]
        update: bool,
    },
    /// Record a test run as an asciicast
    Record {
        /// Test file to run under the recorder
        test: PathBuf,
        /// Output `.cast` file
        output: PathBuf,
    },
    /// Play an asciicast recording
    Play {
        /// The `.cast` file to play
        cast: PathBuf,
    },
    /// Convert a snapshot file to asciicast format
    ConvertCast {
        /// Snapshot JSON file
        snapshot: PathBuf,
        /// Output `.cast` file
        output: PathBuf,
    },
    /// Play back a recorded terminal session with scriptreplay
    Playback {
        /// Recorded session file
        session: PathBuf,
    },
    /// Generate starter script tests for a project
    Scaffold {
        /// Project directory (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Infer command info and write `.scriptbox_info`
    Infer {
        /// Project directory (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Test {
            pattern,
            docker,
            docker_image,
            update,
        } => run_tests(pattern, docker, docker_image, update),
        Commands::Record { test, output } => run_record(&test, &output),
        Commands::Play { cast } => Ok(recording::play(&cast)?),
        Commands::ConvertCast { snapshot, output } => {
            recording::convert_snapshot(&snapshot, &output)?;
            println!("converted {} -> {}", snapshot.display(), output.display());
            Ok(())
        }
        Commands::Playback { session } => run_playback(&session),
        Commands::Scaffold { dir } => run_scaffold(dir),
        Commands::Infer { dir } => run_infer(dir),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the suite: in Docker, or by delegating to the project's own test
/// build with the pattern exported in the environment.
fn run_tests(
    pattern: Option<String>,
    use_docker: bool,
    docker_image: Option<String>,
    update: bool,
) -> Result<()> {
    let pattern = pattern.unwrap_or_else(|| "testdata/*.txt".to_string());

    if use_docker {
        let scripts = harness::discover(&pattern)?;
        let config = docker::SuiteConfig {
            scripts,
            image: docker_image.unwrap_or_else(|| "rust:latest".to_string()),
            update_snapshots: update,
            verbose: tracing::enabled!(tracing::Level::DEBUG),
        };
        docker::run_suite(&config)?;
        return Ok(());
    }

    tracing::debug!(%pattern, "delegating to cargo test");
    let mut command = Command::new("cargo");
    command.arg("test").env("SCRIPTBOX_PATTERN", &pattern);
    if update {
        command.env("UPDATE_SNAPSHOTS", "1");
    }
    let status = command
        .status()
        .map_err(|err| Error::tool("cargo", err.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::tool("cargo", format!("tests failed with {status}")).into())
    }
}

/// Verify the test passes, then record it under asciinema.
fn run_record(test: &Path, output: &Path) -> Result<()> {
    let test_arg = test.display().to_string();
    run_tests(Some(test_arg.clone()), false, None, false)?;
    recording::record(output, &format!("scriptbox test {test_arg}"))?;
    println!("recording saved to {}", output.display());
    Ok(())
}

fn run_playback(session: &Path) -> Result<()> {
    recording::require_tool("scriptreplay")?;
    let status = Command::new("scriptreplay")
        .arg(session)
        .status()
        .map_err(|err| Error::tool("scriptreplay", err.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::tool("scriptreplay", format!("playback exited with {status}")).into())
    }
}

fn run_scaffold(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let created = scaffold::scaffold(&dir, &QueryTool::default())?;
    for path in created {
        println!("created {}", path.display());
    }
    Ok(())
}

fn run_infer(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let path = scaffold::write_info(&dir, &QueryTool::default())?;
    println!("command info written to {}", path.display());
    Ok(())
}
