//! Scriptbox: a harness for script-driven command-line tests.
//!
//! This crate bridges an external command-script engine into the Rust
//! test runner and supplies the pieces around it: an interactive session
//! controller (spawn / send / expect / interact), output snapshotting,
//! Docker-backed suite execution, asciicast conversion, and scaffolding
//! glue for an external text-generation tool.
//!
//! The script engine itself — parsing test files, built-in commands,
//! output assertions — is deliberately out of scope and consumed through
//! the [`engine::ScriptEngine`] trait and the [`engine::CmdRegistry`]
//! registration surface.
//!
//! # Example
//!
//! ```no_run
//! use scriptbox::harness::{LogSink, Options, Runner};
//! # struct MyEngine;
//! # impl scriptbox::engine::ScriptEngine for MyEngine {
//! #     fn execute(
//! #         &self,
//! #         _ctx: &mut scriptbox::engine::ExecContext,
//! #         _registry: &scriptbox::engine::CmdRegistry,
//! #         _script: &std::path::Path,
//! #     ) -> scriptbox::Result<()> { Ok(()) }
//! # }
//!
//! # fn example() -> scriptbox::Result<()> {
//! let runner = Runner::new(Options::default());
//! let summary = runner.run(&MyEngine, &mut LogSink)?;
//! assert!(summary.success());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
// Library documentation is in progress. Public API types have docs;
// internal types will be documented in future releases.
#![allow(missing_docs)]

pub mod commands;
pub mod docker;
pub mod engine;
pub mod error;
pub mod harness;
pub mod matcher;
pub mod recording;
pub mod scaffold;
pub mod session;
pub mod snapshot;

pub use error::{Error, Result};
