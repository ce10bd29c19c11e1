//! Project and section data model.
//!
//! A project is an ordered chain of sections. Section order is meaningful:
//! it drives legacy positional lookups and the fallback input derivation
//! for sections without declared dependencies. Projects round-trip through
//! YAML files with serde defaults so hand-written files stay terse.

pub mod graph;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProjectError;

/// Lifecycle status of a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Not yet executed.
    #[default]
    NotStarted,
    /// Currently executing.
    InProgress,
    /// Executed successfully; excluded from pending sets.
    Complete,
    /// Executed but flagged for another pass.
    NeedsRevision,
    /// Deliberately excluded by the user; excluded from pending sets.
    Skipped,
}

impl SectionStatus {
    /// Returns true if a section in this status belongs to the
    /// pending-execution set.
    pub fn is_pending(self) -> bool {
        !matches!(self, SectionStatus::Complete | SectionStatus::Skipped)
    }

    /// Returns true if the transition from `self` to `to` is legal.
    ///
    /// Status moves only forward: not_started → in_progress →
    /// {complete, needs_revision}, with needs_revision → in_progress for
    /// re-runs. Skipping is only possible before completion.
    pub fn can_transition(self, to: SectionStatus) -> bool {
        use SectionStatus::*;
        matches!(
            (self, to),
            (NotStarted, InProgress)
                | (InProgress, Complete)
                | (InProgress, NeedsRevision)
                | (NeedsRevision, InProgress)
                | (NotStarted, Skipped)
                | (NeedsRevision, Skipped)
        )
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionStatus::NotStarted => "not_started",
            SectionStatus::InProgress => "in_progress",
            SectionStatus::Complete => "complete",
            SectionStatus::NeedsRevision => "needs_revision",
            SectionStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Kind of an on-demand process step attached to a parent section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStepKind {
    Validation,
    Refinement,
    Integration,
}

impl ProcessStepKind {
    /// All process-step kinds, in trigger-menu order.
    pub const ALL: [ProcessStepKind; 3] = [
        ProcessStepKind::Validation,
        ProcessStepKind::Refinement,
        ProcessStepKind::Integration,
    ];

    /// Stable name used for template lookup and section ids.
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStepKind::Validation => "validation",
            ProcessStepKind::Refinement => "refinement",
            ProcessStepKind::Integration => "integration",
        }
    }
}

impl fmt::Display for ProcessStepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node in a project's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Stable identifier, unique within the project.
    pub section_id: String,
    /// Template lookup key; may differ from the id.
    pub step_name: String,
    #[serde(default)]
    pub status: SectionStatus,
    /// User-supplied or derived text fed into this section.
    #[serde(default)]
    pub input: String,
    /// Text produced by the backend; empty until executed.
    #[serde(default)]
    pub output: String,
    /// Ids of sections in the same project whose outputs feed this one,
    /// in join order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Modifier fragment names valid for this step, in injection order.
    #[serde(default)]
    pub modifiers: Vec<String>,
    #[serde(default)]
    pub is_process_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_step_type: Option<ProcessStepKind>,
    #[serde(default)]
    pub is_inference_step: bool,
    /// Name or path of a specialized fragment appended at assembly time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialized: Option<String>,
    /// 4-character token correlating this section with external files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtt_transcript: Option<String>,
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
}

impl Section {
    /// Creates a new section in the `not_started` state.
    pub fn new(section_id: impl Into<String>, step_name: impl Into<String>) -> Self {
        Self {
            section_id: section_id.into(),
            step_name: step_name.into(),
            status: SectionStatus::NotStarted,
            input: String::new(),
            output: String::new(),
            dependencies: Vec::new(),
            modifiers: Vec::new(),
            is_process_step: false,
            process_step_type: None,
            is_inference_step: false,
            specialized: None,
            automation_id: None,
            user_description: None,
            vtt_transcript: None,
            last_modified: Utc::now(),
        }
    }

    /// Sets the declared dependencies.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the modifier list.
    pub fn with_modifiers(mut self, modifiers: Vec<String>) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Sets the user-supplied input.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    /// Marks this section as an inference step.
    pub fn as_inference_step(mut self) -> Self {
        self.is_inference_step = true;
        self
    }

    /// Sets the specialized fragment name or path.
    pub fn with_specialized(mut self, specialized: impl Into<String>) -> Self {
        self.specialized = Some(specialized.into());
        self
    }

    /// Returns the automation token for this section.
    ///
    /// Uses the stored `automation_id` when present; otherwise derives a
    /// stable 4-character token from the section id, so repeated calls for
    /// the same section always agree.
    pub fn automation_token(&self) -> String {
        if let Some(id) = &self.automation_id {
            return id.clone();
        }
        let digest = Sha256::digest(self.section_id.as_bytes());
        format!("{:02x}{:02x}", digest[0], digest[1])
    }

    /// Transitions the section to a new status.
    ///
    /// # Errors
    ///
    /// Returns `ProjectError::InvalidTransition` if the move is illegal.
    pub fn transition(&mut self, to: SectionStatus) -> Result<(), ProjectError> {
        if !self.status.can_transition(to) {
            return Err(ProjectError::InvalidTransition {
                section: self.section_id.clone(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.last_modified = Utc::now();
        Ok(())
    }
}

fn default_case_number() -> u8 {
    1
}

/// A content-generation project: an ordered, dependency-annotated chain of
/// sections plus the state shared across them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// Workflow variant selector (1-7).
    #[serde(default = "default_case_number")]
    pub case_number: u8,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_directory: Option<String>,
    /// Carried-over output from an antecedent project in a case chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_case_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vtt_transcript: Option<String>,
}

impl Project {
    /// Creates an empty project.
    pub fn new(id: impl Into<String>, case_number: u8) -> Self {
        Self {
            id: id.into(),
            case_number,
            sections: Vec::new(),
            scope_directory: None,
            automation_directory: None,
            previous_case_output: None,
            user_description: None,
            vtt_transcript: None,
        }
    }

    /// Builds a project from the canonical step blueprint, wiring each
    /// section's default dependencies.
    pub fn standard(id: impl Into<String>, case_number: u8) -> Self {
        let mut project = Self::new(id, case_number);
        for step in graph::CANONICAL_STEPS {
            let section =
                Section::new(step, step).with_dependencies(graph::default_dependencies(step));
            project.sections.push(section);
        }
        project
    }

    /// Gets a section by id.
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }

    /// Gets a mutable section by id.
    pub fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.section_id == section_id)
    }

    /// Appends a process step attached to a parent section.
    ///
    /// Process steps are appended, never replace existing sections. The new
    /// section depends on its parent and carries the parent's step context
    /// in its id (`{parent}-{kind}`).
    ///
    /// # Errors
    ///
    /// Returns `SectionNotFound` if the parent does not exist, or
    /// `DuplicateSectionId` if a step of this kind was already attached.
    pub fn add_process_step(
        &mut self,
        parent_id: &str,
        kind: ProcessStepKind,
    ) -> Result<&Section, ProjectError> {
        let parent = self
            .section(parent_id)
            .ok_or_else(|| ProjectError::SectionNotFound(parent_id.to_string()))?;

        let section_id = format!("{}-{}", parent.section_id, kind);
        if self.section(&section_id).is_some() {
            return Err(ProjectError::DuplicateSectionId(section_id));
        }

        let mut section = Section::new(section_id.clone(), kind.as_str())
            .with_dependencies(vec![parent_id.to_string()]);
        section.is_process_step = true;
        section.process_step_type = Some(kind);
        self.sections.push(section);

        Ok(self.section(&section_id).expect("section was just inserted"))
    }

    /// Loads a project from a YAML file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content).map_err(|e| ProjectError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parses a project from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Serializes the project to YAML text.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Saves the project to a YAML file.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ProjectError> {
        let content = self.to_yaml()?;
        tokio::fs::write(path.as_ref(), content).await?;
        Ok(())
    }

    /// Validates the project structure.
    ///
    /// Hard failures (duplicate ids, dependency cycles, case out of range)
    /// return an error. Dependencies that point at unknown sections are
    /// returned as warnings: they are silently skipped at substitution
    /// time, but surfacing them helps catch typos in project files.
    pub fn validate(&self) -> Result<Vec<String>, ProjectError> {
        if !(1..=7).contains(&self.case_number) {
            return Err(ProjectError::InvalidCaseNumber(self.case_number));
        }

        let mut seen = std::collections::HashSet::new();
        for section in &self.sections {
            if !seen.insert(section.section_id.as_str()) {
                return Err(ProjectError::DuplicateSectionId(
                    section.section_id.clone(),
                ));
            }
        }

        if let Some(on_cycle) = graph::detect_cycle(self) {
            return Err(ProjectError::DependencyCycle(on_cycle));
        }

        let mut warnings = Vec::new();
        for section in &self.sections {
            for dep in &section.dependencies {
                if self.section(dep).is_none() {
                    warnings.push(format!(
                        "section '{}' depends on unknown section '{}'",
                        section.section_id, dep
                    ));
                }
            }
        }

        Ok(warnings)
    }
}
