//! Error types for promptforge operations.
//!
//! Defines error types for the major subsystems:
//! - Project file loading and validation
//! - Run validation (pre-start checks)
//! - Backend execution calls
//! - Pipeline run orchestration
//!
//! Template and reference absence is not an error: the fetch layer returns
//! `Option` values and callers must check them explicitly.

use thiserror::Error;

/// Errors that can occur while loading or validating a project.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Failed to parse project file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Duplicate section id '{0}'")]
    DuplicateSectionId(String),

    #[error("Section '{0}' not found in project")]
    SectionNotFound(String),

    #[error("Dependency cycle detected involving section '{0}'")]
    DependencyCycle(String),

    #[error("Invalid case number {0}: must be between 1 and 7")]
    InvalidCaseNumber(u8),

    #[error("Invalid status transition from '{from}' to '{to}' on section '{section}'")]
    InvalidTransition {
        section: String,
        from: String,
        to: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Validation failures that abort a run before it starts.
///
/// A missing scope directory and an empty pending set are distinct kinds,
/// even though both surface to the user as "run could not start".
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("No scope directory resolved: pass one explicitly, set it on the project, or configure a default")]
    MissingScopeDirectory,

    #[error("No pending sections to execute")]
    NothingToRun,

    #[error("Project failed validation: {0}")]
    Project(#[from] ProjectError),
}

/// Errors from the external execution backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Backend returned status {code}: {message}")]
    Http { code: u16, message: String },

    #[error("Backend rejected the request: {0}")]
    Rejected(String),

    #[error("Failed to parse backend response: {0}")]
    ParseError(String),
}

/// Errors that terminate a pipeline run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("A run is already active for this executor")]
    AlreadyRunning,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Fail-stop: the run halts, completed sections stay completed, and the
    /// failing section remains non-complete.
    #[error("Section '{section_id}' failed: {source}")]
    Execution {
        section_id: String,
        #[source]
        source: BackendError,
    },

    /// Unexpected orchestration failure, surfaced with its own severity so
    /// callers can offer a whole-run retry.
    #[error("Fatal run error: {0}")]
    Fatal(String),
}
