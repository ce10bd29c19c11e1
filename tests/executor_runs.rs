//! Integration tests for the pipeline executor.
//!
//! These tests drive full runs with in-memory templates and scripted
//! backends: completion, output propagation, fail-stop, cooperative
//! cancellation, validation failures, and best-effort persistence.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use promptforge::assembly::PromptAssembler;
use promptforge::backend::{BackendClient, ExecutionRequest, ExecutionResponse, FsOutputWriter};
use promptforge::config::EngineConfig;
use promptforge::error::{BackendError, RunError, ValidationError};
use promptforge::pipeline::{CancelHandle, PipelineExecutor, RunOutcome, RunState};
use promptforge::project::{Project, Section, SectionStatus};
use promptforge::template::{MemorySource, ReferenceCatalog, TemplateStore};

/// Backend that answers `output-N` per call, optionally failing at one
/// 1-based call index, and records every prompt it receives.
struct ScriptedBackend {
    calls: AtomicUsize,
    fail_at: Option<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(fail_at: Option<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_at,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("not poisoned").clone()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts
            .lock()
            .expect("not poisoned")
            .push(request.prompt);
        if self.fail_at == Some(n) {
            return Ok(ExecutionResponse::failure(format!(
                "injected failure at call {}",
                n
            )));
        }
        Ok(ExecutionResponse::ok(format!("output-{}", n)))
    }
}

/// Backend that requests cancellation after its nth successful call.
struct CancellingBackend {
    calls: AtomicUsize,
    stop_after: usize,
    handle: Mutex<Option<CancelHandle>>,
}

impl CancellingBackend {
    fn new(stop_after: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            stop_after,
            handle: Mutex::new(None),
        }
    }

    fn set_handle(&self, handle: CancelHandle) {
        *self.handle.lock().expect("not poisoned") = Some(handle);
    }
}

#[async_trait]
impl BackendClient for CancellingBackend {
    async fn execute(&self, _request: ExecutionRequest) -> Result<ExecutionResponse, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.stop_after {
            if let Some(handle) = self.handle.lock().expect("not poisoned").as_ref() {
                handle.stop();
            }
        }
        Ok(ExecutionResponse::ok(format!("output-{}", n)))
    }
}

fn memory_templates() -> MemorySource {
    MemorySource::new()
        .with_file("templates/steps/step-a.md", "Produce A.")
        .with_file("templates/steps/step-b.md", "Build on: {USER_INPUT}")
        .with_file("templates/steps/step-c.md", "Finish with: {USER_INPUT}")
}

fn executor_with(backend: Arc<dyn BackendClient>, source: MemorySource) -> PipelineExecutor {
    let source = Arc::new(source);
    let roots = vec![PathBuf::from("templates")];
    let store = Arc::new(TemplateStore::new(source.clone(), roots.clone()));
    let catalog = Arc::new(ReferenceCatalog::new(source, roots));
    PipelineExecutor::new(PromptAssembler::new(store, catalog), backend, EngineConfig::default())
}

fn three_section_project() -> Project {
    let mut project = Project::new("itest", 1);
    project.sections.push(Section::new("a", "step-a"));
    project
        .sections
        .push(Section::new("b", "step-b").with_dependencies(vec!["a".to_string()]));
    project.sections.push(Section::new("c", "step-c").with_dependencies(vec![
        "a".to_string(),
        "b".to_string(),
    ]));
    project
}

#[tokio::test]
async fn test_full_run_completes_in_order() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();

    let report = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run succeeds");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(
        report.completed,
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert!(report.skipped_missing_template.is_empty());
    assert_eq!(executor.state(), RunState::Completed);
    assert!(!executor.is_active());

    for id in ["a", "b", "c"] {
        assert_eq!(project.section(id).unwrap().status, SectionStatus::Complete);
    }
    assert_eq!(project.section("a").unwrap().output, "output-1");
    assert_eq!(project.section("c").unwrap().output, "output-3");
}

#[tokio::test]
async fn test_outputs_propagate_along_dependencies() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();

    executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run succeeds");

    let prompts = backend.prompts();
    assert_eq!(prompts.len(), 3);
    // Section b consumed a's output; section c consumed both, joined.
    assert_eq!(prompts[1], "Build on: output-1");
    assert_eq!(prompts[2], "Finish with: output-1\n\n---\n\noutput-2");
}

#[tokio::test]
async fn test_failure_at_section_k_is_fail_stop() {
    let backend = Arc::new(ScriptedBackend::new(Some(2)));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();

    let err = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect_err("run fails");

    match err {
        RunError::Execution { section_id, source } => {
            assert_eq!(section_id, "b");
            assert!(matches!(source, BackendError::Rejected(_)));
        }
        other => panic!("expected execution error, got {:?}", other),
    }

    // Exactly k-1 sections completed; the failing section and everything
    // after it are untouched.
    assert_eq!(project.section("a").unwrap().status, SectionStatus::Complete);
    assert_eq!(
        project.section("b").unwrap().status,
        SectionStatus::NotStarted
    );
    assert_eq!(
        project.section("c").unwrap().status,
        SectionStatus::NotStarted
    );
    assert!(project.section("b").unwrap().output.is_empty());
    assert_eq!(backend.call_count(), 2);
    assert_eq!(executor.state(), RunState::Failed);
    assert!(!executor.is_active());
}

#[tokio::test]
async fn test_cancellation_stops_before_next_section() {
    let backend = Arc::new(CancellingBackend::new(1));
    let executor = executor_with(backend.clone(), memory_templates());
    backend.set_handle(executor.cancel_handle());
    let mut project = three_section_project();

    let report = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("cancelled runs still report");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.completed, vec!["a".to_string()]);
    assert_eq!(executor.state(), RunState::Cancelled);

    // The in-flight section finished and stays completed; nothing after
    // it ever started.
    assert_eq!(project.section("a").unwrap().status, SectionStatus::Complete);
    assert_eq!(
        project.section("b").unwrap().status,
        SectionStatus::NotStarted
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_scope_directory_fails_validation() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();

    let err = executor.start(&mut project, None).await.expect_err("no scope");
    assert!(matches!(
        err,
        RunError::Validation(ValidationError::MissingScopeDirectory)
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_project_scope_directory_is_used() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();
    project.scope_directory = Some("/from-project".to_string());

    executor
        .start(&mut project, None)
        .await
        .expect("project-level scope resolves");
    assert_eq!(backend.call_count(), 3);
}

#[tokio::test]
async fn test_empty_pending_set_fails_validation() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();
    for section in &mut project.sections {
        section.status = SectionStatus::Complete;
    }

    let err = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect_err("nothing to do");
    assert!(matches!(
        err,
        RunError::Validation(ValidationError::NothingToRun)
    ));
}

#[tokio::test]
async fn test_missing_template_skips_section_only() {
    let backend = Arc::new(ScriptedBackend::new(None));
    // step-b's template is missing; a and c still run.
    let source = MemorySource::new()
        .with_file("templates/steps/step-a.md", "Produce A.")
        .with_file("templates/steps/step-c.md", "Finish with: {USER_INPUT}");
    let executor = executor_with(backend.clone(), source);
    let mut project = three_section_project();

    let report = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run continues past the missing template");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.completed, vec!["a".to_string(), "c".to_string()]);
    assert_eq!(report.skipped_missing_template, vec!["b".to_string()]);
    assert_eq!(
        project.section("b").unwrap().status,
        SectionStatus::NotStarted
    );
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn test_completed_sections_are_not_rerun() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates());
    let mut project = three_section_project();
    {
        let a = project.section_mut("a").unwrap();
        a.status = SectionStatus::Complete;
        a.output = "kept".to_string();
    }

    let report = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run succeeds");

    assert_eq!(report.completed, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(project.section("a").unwrap().output, "kept");
    // b's input came from the pre-existing output of a.
    assert_eq!(backend.prompts()[0], "Build on: kept");
}

#[tokio::test]
async fn test_outputs_are_persisted_best_effort() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let automation_dir = dir.path().join("auto");

    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates())
        .with_writer(Arc::new(FsOutputWriter::new()));
    let mut project = three_section_project();
    project.automation_directory = Some(automation_dir.display().to_string());

    executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run succeeds");

    let token = project.section("a").unwrap().automation_token();
    let saved = automation_dir.join(format!("step-a-{}.md", token));
    let content = tokio::fs::read_to_string(&saved)
        .await
        .expect("output file written");
    assert_eq!(content, "output-1");
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_run() {
    let backend = Arc::new(ScriptedBackend::new(None));
    let executor = executor_with(backend.clone(), memory_templates())
        .with_writer(Arc::new(FsOutputWriter::new()));
    let mut project = three_section_project();
    // An unwritable automation directory: the run must still complete.
    project.automation_directory = Some("/dev/null/cannot-exist".to_string());

    let report = executor
        .start(&mut project, Some("/scope"))
        .await
        .expect("run succeeds despite persistence failures");
    assert_eq!(report.completed.len(), 3);
}
