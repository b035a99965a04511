//! # Command-Line Interface
//!
//! User-facing `tasks` commands and output formatting.
//!
//! ## Commands
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Query | Readiness and structure | `ready`, `graph`, `stats`, `analyze`, `list`, `show`, `validate` |
//! | Transition | State changes with triggers | `set`, `check` |
//!
//! ## Exit Codes
//!
//! - `0` success
//! - `1` rejected transition, failed check, validation problems, or a
//!   blocking cycle during `analyze`
//! - `2` unknown or malformed task ID for `graph`
//! - `3` unknown or malformed task ID for `set`, `show` and `check`
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Warnings and diagnostics always go to stderr.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod query;
mod task;
mod workspace;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
