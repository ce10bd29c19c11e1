//! Pipeline executor.
//!
//! Runs a project's pending sections strictly sequentially against the
//! execution backend: validate, compute the pending order once, then for
//! each section derive input, assemble the prompt, execute, and persist.
//! Cancellation is cooperative and checked only at section boundaries;
//! backend failures fail-stop the whole run.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assembly::{AssemblyOptions, PromptAssembler};
use crate::backend::{BackendClient, ExecutionRequest, OutputWriter};
use crate::config::EngineConfig;
use crate::error::{BackendError, RunError, ValidationError};
use crate::project::{graph, Project, SectionStatus};

use super::input::derive_input;

/// State of an executor's current (or last) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Validating = 1,
    Running = 2,
    Completed = 3,
    Cancelled = 4,
    Failed = 5,
}

impl RunState {
    fn from_u8(value: u8) -> RunState {
        match value {
            1 => RunState::Validating,
            2 => RunState::Running,
            3 => RunState::Completed,
            4 => RunState::Cancelled,
            5 => RunState::Failed,
            _ => RunState::Idle,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Validating => "validating",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// How a run ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every pending section was processed.
    Completed,
    /// The cancellation flag stopped the run at a section boundary.
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Sections completed by this run, in execution order.
    pub completed: Vec<String>,
    /// Sections skipped because no template resolved for them.
    pub skipped_missing_template: Vec<String>,
    pub duration: Duration,
}

/// Cheaply cloneable handle for cancelling a run from outside.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Requests cancellation and immediately marks the run as no longer
    /// active. An in-flight backend call is not aborted; its section still
    /// completes, but no further section starts.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Sequential executor for a project's pending sections.
pub struct PipelineExecutor {
    assembler: PromptAssembler,
    backend: Arc<dyn BackendClient>,
    writer: Option<Arc<dyn OutputWriter>>,
    config: EngineConfig,
    active: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    state: AtomicU8,
}

impl PipelineExecutor {
    /// Creates an executor over an assembler and a backend.
    pub fn new(
        assembler: PromptAssembler,
        backend: Arc<dyn BackendClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            assembler,
            backend,
            writer: None,
            config,
            active: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: AtomicU8::new(RunState::Idle as u8),
        }
    }

    /// Attaches a best-effort output writer.
    pub fn with_writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Whether a run is currently active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Handle for cancelling the active run from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
            active: Arc::clone(&self.active),
        }
    }

    /// Requests cancellation of the active run.
    pub fn stop(&self) {
        self.cancel_handle().stop();
    }

    /// Runs all pending sections of `project`.
    ///
    /// Only one run may be active at a time; a reentrant call is rejected,
    /// not queued. Holding `&mut Project` for the whole run serializes
    /// out-of-band edits against it.
    ///
    /// # Errors
    ///
    /// `RunError::Validation` before anything starts,
    /// `RunError::Execution` when a section's backend call fails
    /// (fail-stop: earlier sections stay completed, the failing section
    /// and everything after it are untouched), `RunError::Fatal` for
    /// unexpected orchestration failures. The active flag is cleared on
    /// every exit path.
    pub async fn start(
        &self,
        project: &mut Project,
        scope_dir: Option<&str>,
    ) -> Result<RunReport, RunError> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(RunError::AlreadyRunning);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        self.set_state(RunState::Validating);

        let result = self.run_inner(project, scope_dir).await;

        self.active.store(false, Ordering::SeqCst);
        match &result {
            Ok(report) => self.set_state(match report.outcome {
                RunOutcome::Completed => RunState::Completed,
                RunOutcome::Cancelled => RunState::Cancelled,
            }),
            Err(_) => self.set_state(RunState::Failed),
        }
        result
    }

    async fn run_inner(
        &self,
        project: &mut Project,
        scope_dir: Option<&str>,
    ) -> Result<RunReport, RunError> {
        let scope_directory = scope_dir
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                project
                    .scope_directory
                    .clone()
                    .filter(|s| !s.trim().is_empty())
            })
            .or_else(|| {
                self.config
                    .default_scope_directory
                    .clone()
                    .filter(|s| !s.trim().is_empty())
            })
            .ok_or(ValidationError::MissingScopeDirectory)?;

        // The pending order is fixed at run start and never recomputed.
        let pending = graph::pending_sections(project);
        if pending.is_empty() {
            return Err(ValidationError::NothingToRun.into());
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, project = %project.id, sections = pending.len(), "starting pipeline run");
        self.set_state(RunState::Running);

        let mut completed = Vec::new();
        let mut skipped_missing_template = Vec::new();
        let mut outcome = RunOutcome::Completed;

        for section_id in &pending {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(%run_id, section = %section_id, "run cancelled before section start");
                outcome = RunOutcome::Cancelled;
                break;
            }

            let prompt = {
                let project_view: &Project = project;
                let section = project_view
                    .section(section_id)
                    .ok_or_else(|| RunError::Fatal(format!("section '{}' vanished mid-run", section_id)))?;
                let input = derive_input(project_view, section);
                let options = AssemblyOptions {
                    input: Some(&input),
                    include_references: self.config.include_references,
                };
                self.assembler.assemble(section, project_view, &options).await
            };

            let Some(prompt) = prompt else {
                warn!(%run_id, section = %section_id, "no template resolved, skipping section");
                skipped_missing_template.push(section_id.clone());
                continue;
            };

            let prior_status = self.mark_in_progress(project, section_id)?;
            info!(%run_id, section = %section_id, "executing section");

            let request = ExecutionRequest::new(prompt, scope_directory.clone());
            match self.backend.execute(request).await {
                Ok(response) if response.success => {
                    self.record_success(project, section_id, response.output)?;
                    completed.push(section_id.clone());
                    self.persist_output(project, section_id).await;
                }
                Ok(response) => {
                    self.restore_status(project, section_id, prior_status);
                    return Err(RunError::Execution {
                        section_id: section_id.clone(),
                        source: BackendError::Rejected(
                            response
                                .error
                                .unwrap_or_else(|| "backend reported failure".to_string()),
                        ),
                    });
                }
                Err(e) => {
                    self.restore_status(project, section_id, prior_status);
                    return Err(RunError::Execution {
                        section_id: section_id.clone(),
                        source: e,
                    });
                }
            }
        }

        let duration = started.elapsed();
        info!(%run_id, completed = completed.len(), outcome = ?outcome, "pipeline run finished");

        Ok(RunReport {
            run_id,
            outcome,
            completed,
            skipped_missing_template,
            duration,
        })
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Moves a section into `in_progress`, returning its prior status so a
    /// failed execution can leave the section untouched.
    fn mark_in_progress(
        &self,
        project: &mut Project,
        section_id: &str,
    ) -> Result<SectionStatus, RunError> {
        let section = project
            .section_mut(section_id)
            .ok_or_else(|| RunError::Fatal(format!("section '{}' vanished mid-run", section_id)))?;
        let prior = section.status;
        if prior != SectionStatus::InProgress {
            section
                .transition(SectionStatus::InProgress)
                .map_err(|e| RunError::Fatal(e.to_string()))?;
        }
        Ok(prior)
    }

    fn record_success(
        &self,
        project: &mut Project,
        section_id: &str,
        output: String,
    ) -> Result<(), RunError> {
        let section = project
            .section_mut(section_id)
            .ok_or_else(|| RunError::Fatal(format!("section '{}' vanished mid-run", section_id)))?;
        section.output = output;
        section
            .transition(SectionStatus::Complete)
            .map_err(|e| RunError::Fatal(e.to_string()))?;
        Ok(())
    }

    fn restore_status(&self, project: &mut Project, section_id: &str, prior: SectionStatus) {
        if let Some(section) = project.section_mut(section_id) {
            section.status = prior;
        }
    }

    /// Best-effort output persistence; failures are logged, never
    /// propagated into the run outcome.
    async fn persist_output(&self, project: &Project, section_id: &str) {
        let Some(writer) = &self.writer else {
            return;
        };
        let Some(section) = project.section(section_id) else {
            return;
        };

        let automation_dir = project
            .automation_directory
            .clone()
            .unwrap_or_else(|| self.config.default_automation_directory.clone());

        match writer
            .save(
                &automation_dir,
                &section.step_name,
                &section.automation_token(),
                &section.output,
            )
            .await
        {
            Ok(path) => debug!(section = %section_id, path = %path.display(), "section output persisted"),
            Err(e) => warn!(section = %section_id, error = %e, "failed to persist section output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_round_trip() {
        for state in [
            RunState::Idle,
            RunState::Validating,
            RunState::Running,
            RunState::Completed,
            RunState::Cancelled,
            RunState::Failed,
        ] {
            assert_eq!(RunState::from_u8(state as u8), state);
        }
        assert_eq!(RunState::from_u8(200), RunState::Idle);
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::Running.to_string(), "running");
        assert_eq!(RunState::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_cancel_handle_flags() {
        let handle = CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicBool::new(true)),
        };
        assert!(!handle.is_cancelled());

        handle.stop();
        assert!(handle.is_cancelled());
        assert!(!handle.active.load(Ordering::SeqCst));
    }
}
