//! Command-line interface for promptforge.
//!
//! Provides commands for project scaffolding, validation, prompt
//! assembly previews, and pipeline runs.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
