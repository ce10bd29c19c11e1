//! Dependency-ordered pipeline execution.
//!
//! This module provides the sequential `PipelineExecutor` plus the input
//! derivation rules feeding each section before it runs.

pub mod executor;
pub mod input;

pub use executor::{CancelHandle, PipelineExecutor, RunOutcome, RunReport, RunState};
pub use input::{derive_input, SEPARATOR};
