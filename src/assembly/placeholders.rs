//! Placeholder language substitution.
//!
//! Templates carry a fixed, enumerable set of `{TOKEN}` placeholders plus a
//! legacy `[OUTPUT_FROM_SECTION_*]` reference form. Substitution is textual
//! and runs as a single pass over the pre-substitution text: substituted
//! values are never re-scanned, so a dependency output containing a
//! placeholder spelling cannot trigger further expansion. Unknown tokens
//! are left in place verbatim.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::DEFAULT_AUTOMATION_DIR;
use crate::pipeline::input::{joined_dependency_outputs, SEPARATOR};
use crate::project::{graph, ProcessStepKind, Project, Section};

/// Per-output clip applied inside the `{PREVIOUS_STEPS}` listing.
pub const PRIOR_OUTPUT_CLIP: usize = 500;

/// State a template is resolved against.
pub struct PlaceholderContext<'a> {
    pub project: &'a Project,
    pub section: &'a Section,
    /// Value for `{USER_INPUT}`/`{INPUT}`. These tokens substitute only
    /// when a value is supplied (pipeline runs and explicit copy actions);
    /// otherwise they stay in place.
    pub input: Option<&'a str>,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{[A-Z_]+\}|\[OUTPUT_FROM_SECTION_[^\]]+\]").expect("valid pattern")
    })
}

/// Substitutes the placeholder language against project/section state.
pub fn substitute(text: &str, ctx: &PlaceholderContext<'_>) -> String {
    placeholder_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let token = &caps[0];
            resolve(token, ctx).unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

fn resolve(token: &str, ctx: &PlaceholderContext<'_>) -> Option<String> {
    if let Some(reference) = token
        .strip_prefix("[OUTPUT_FROM_SECTION_")
        .and_then(|t| t.strip_suffix(']'))
    {
        return Some(resolve_legacy_reference(reference, ctx.project));
    }

    match token {
        "{CASE}" => Some(ctx.project.case_number.to_string()),
        "{MODIFIERS}" => Some(if ctx.section.modifiers.is_empty() {
            "none".to_string()
        } else {
            ctx.section.modifiers.join(", ")
        }),
        "{PREVIOUS_OUTPUT}" => Some(previous_output(ctx)),
        "{PREVIOUS_STEP}" => Some(previous_step_names(ctx)),
        "{PREVIOUS_STEPS}" => Some(prior_outputs_list(ctx)),
        "{INPUT_SOURCES}" => Some(input_sources_description(
            ctx.project.case_number,
            has_enhancement_modifier(ctx.section),
        )),
        "{USER_INPUT}" | "{INPUT}" => ctx.input.map(str::to_string),
        "{AUTOMATION_DIR}" => Some(
            ctx.project
                .automation_directory
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTOMATION_DIR.to_string()),
        ),
        "{AUTOMATION_ID}" => Some(ctx.section.automation_token()),
        "{EXISTING_FEATURES}" => {
            Some(ctx.project.previous_case_output.clone().unwrap_or_default())
        }
        "{PROCESS_STEP_TRIGGERS}" => Some(process_step_triggers(ctx.section)),
        "{WORKFLOW_CONTEXT}" => Some(workflow_context(ctx)),
        "{USER_DESCRIPTION}" => Some(
            ctx.section
                .user_description
                .clone()
                .or_else(|| ctx.project.user_description.clone())
                .unwrap_or_default(),
        ),
        "{VTT_TRANSCRIPT}" => Some(
            ctx.section
                .vtt_transcript
                .clone()
                .or_else(|| ctx.project.vtt_transcript.clone())
                .unwrap_or_default(),
        ),
        "{UX_SPECIFICATIONS}" => named_output(ctx.project, "ux-specifications"),
        "{DATA_MODELS_OUTPUT}" => named_output(ctx.project, "data-models"),
        "{STATE_MACHINES_OUTPUT}" => named_output(ctx.project, "state-machines"),
        "{API_CONTRACTS_OUTPUT}" => named_output(ctx.project, "api-contracts"),
        "{ATOMIC_FEATURES_OUTPUT}" => named_output(ctx.project, "atomic-features"),
        _ => None,
    }
}

/// Dependency outputs joined in declared order, falling back to the
/// positional predecessor's output.
fn previous_output(ctx: &PlaceholderContext<'_>) -> String {
    if !ctx.section.dependencies.is_empty() {
        return joined_dependency_outputs(ctx.project, ctx.section);
    }
    graph::previous_section(ctx.project, &ctx.section.section_id)
        .map(|prev| prev.output.clone())
        .unwrap_or_default()
}

/// Dependency step names, falling back to the positional predecessor.
fn previous_step_names(ctx: &PlaceholderContext<'_>) -> String {
    if !ctx.section.dependencies.is_empty() {
        return ctx
            .section
            .dependencies
            .iter()
            .filter_map(|id| ctx.project.section(id))
            .map(|dep| dep.step_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
    }
    graph::previous_section(ctx.project, &ctx.section.section_id)
        .map(|prev| prev.step_name.clone())
        .unwrap_or_default()
}

/// Numbered listing of every prior section's output, each clipped to
/// [`PRIOR_OUTPUT_CLIP`] characters.
fn prior_outputs_list(ctx: &PlaceholderContext<'_>) -> String {
    let end = graph::position(ctx.project, &ctx.section.section_id)
        .unwrap_or(ctx.project.sections.len());

    ctx.project.sections[..end]
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let clipped: String = section.output.chars().take(PRIOR_OUTPUT_CLIP).collect();
            format!("{}. {}:\n{}", i + 1, section.step_name, clipped)
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn has_enhancement_modifier(section: &Section) -> bool {
    section.modifiers.iter().any(|m| m == "enhancement")
}

/// Static description of where a project's input comes from, keyed by
/// workflow case.
fn input_sources_description(case_number: u8, enhancement: bool) -> String {
    let base = match case_number {
        1 => "User-provided project description",
        2 => "Recorded walkthrough transcript",
        3 => "Project description and walkthrough transcript",
        4 => "Prior case output carried forward",
        5 => "Prior case output with a fresh project description",
        6 => "Prior case output with a walkthrough transcript",
        7 => "Prior case output, project description, and transcript",
        _ => "User-provided project description",
    };
    if enhancement {
        format!("{}, augmented with enhancement notes", base)
    } else {
        base.to_string()
    }
}

/// Process-step kinds applicable to this step. A process step never lists
/// triggers for itself.
fn process_step_triggers(section: &Section) -> String {
    if section.is_process_step {
        return "none".to_string();
    }
    ProcessStepKind::ALL
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn workflow_context(ctx: &PlaceholderContext<'_>) -> String {
    let total = ctx.project.sections.len();
    let position = graph::position(ctx.project, &ctx.section.section_id)
        .map(|pos| pos + 1)
        .unwrap_or(total);
    format!("Step {} of {}: {}", position, total, ctx.section.step_name)
}

/// Output of a specific named section, if present with output. Absent
/// sections leave the token unmatched.
fn named_output(project: &Project, section_id: &str) -> Option<String> {
    project
        .section(section_id)
        .filter(|s| !s.output.is_empty())
        .map(|s| s.output.clone())
}

/// Resolves a legacy `[OUTPUT_FROM_SECTION_<ref>]` reference through the
/// fixed old-id mapping, then by direct id. Unresolved references are
/// rewritten to an explicit marker, never dropped.
fn resolve_legacy_reference(reference: &str, project: &Project) -> String {
    let section_id = legacy_section_id(reference);
    match project.section(section_id).filter(|s| !s.output.is_empty()) {
        Some(section) => section.output.clone(),
        None => format!("[OUTPUT_FROM_SECTION_{}: NOT FOUND]", reference),
    }
}

/// Old numeric section ids map onto the canonical chain; anything else is
/// treated as an id directly.
fn legacy_section_id(reference: &str) -> &str {
    match reference.parse::<usize>() {
        Ok(n) if (1..=graph::CANONICAL_STEPS.len()).contains(&n) => {
            graph::CANONICAL_STEPS[n - 1]
        }
        _ => reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Section;

    fn context_project() -> Project {
        let mut project = Project::standard("test", 2);
        project.section_mut("project-brief").unwrap().output = "brief output".to_string();
        project.section_mut("ux-specifications").unwrap().output = "ux output".to_string();
        project
    }

    #[test]
    fn test_case_and_modifiers() {
        let project = context_project();
        let section = Section::new("x", "x").with_modifiers(vec![
            "strict".to_string(),
            "enhancement".to_string(),
        ]);
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        assert_eq!(substitute("case {CASE}", &ctx), "case 2");
        assert_eq!(
            substitute("mods: {MODIFIERS}", &ctx),
            "mods: strict, enhancement"
        );

        let bare = Section::new("y", "y");
        let ctx = PlaceholderContext {
            project: &project,
            section: &bare,
            input: None,
        };
        assert_eq!(substitute("mods: {MODIFIERS}", &ctx), "mods: none");
    }

    #[test]
    fn test_unknown_token_left_verbatim() {
        let project = context_project();
        let section = Section::new("x", "x");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        assert_eq!(
            substitute("keep {TOTALLY_UNKNOWN} here", &ctx),
            "keep {TOTALLY_UNKNOWN} here"
        );
    }

    #[test]
    fn test_substitution_is_not_reentrant() {
        let mut project = context_project();
        project.section_mut("project-brief").unwrap().output = "contains {CASE} literally".to_string();
        let section =
            Section::new("x", "x").with_dependencies(vec!["project-brief".to_string()]);
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        // The substituted dependency output is not re-scanned.
        assert_eq!(
            substitute("{PREVIOUS_OUTPUT}", &ctx),
            "contains {CASE} literally"
        );
    }

    #[test]
    fn test_previous_output_dependency_join_and_fallback() {
        let project = context_project();
        let section = Section::new("x", "x").with_dependencies(vec![
            "project-brief".to_string(),
            "ux-specifications".to_string(),
        ]);
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(
            substitute("{PREVIOUS_OUTPUT}", &ctx),
            "brief output\n\n---\n\nux output"
        );

        // No dependencies: positional predecessor.
        let section = project.section("data-models").unwrap().clone();
        let positional = Section {
            dependencies: Vec::new(),
            ..section
        };
        let ctx = PlaceholderContext {
            project: &project,
            section: &positional,
            input: None,
        };
        assert_eq!(substitute("{PREVIOUS_OUTPUT}", &ctx), "ux output");
    }

    #[test]
    fn test_previous_step_names() {
        let project = context_project();
        let section = Section::new("x", "x").with_dependencies(vec![
            "ux-specifications".to_string(),
            "ghost".to_string(),
            "project-brief".to_string(),
        ]);
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        assert_eq!(
            substitute("{PREVIOUS_STEP}", &ctx),
            "ux-specifications, project-brief"
        );
    }

    #[test]
    fn test_previous_steps_listing_clips_each_output() {
        let mut project = context_project();
        project.section_mut("project-brief").unwrap().output = "z".repeat(PRIOR_OUTPUT_CLIP + 100);
        let section = project.section("data-models").unwrap().clone();
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        let listing = substitute("{PREVIOUS_STEPS}", &ctx);
        assert!(listing.starts_with("1. project-brief:"));
        assert!(listing.contains("2. ux-specifications:\nux output"));
        assert!(!listing.contains(&"z".repeat(PRIOR_OUTPUT_CLIP + 1)));
        assert!(listing.contains(&"z".repeat(PRIOR_OUTPUT_CLIP)));
    }

    #[test]
    fn test_user_input_substitutes_only_when_requested() {
        let project = context_project();
        let section = Section::new("x", "x");

        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(substitute("in: {USER_INPUT}", &ctx), "in: {USER_INPUT}");

        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: Some("derived"),
        };
        assert_eq!(substitute("in: {USER_INPUT} / {INPUT}", &ctx), "in: derived / derived");
    }

    #[test]
    fn test_automation_tokens() {
        let mut project = context_project();
        let section = Section::new("data-models", "data-models");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(
            substitute("{AUTOMATION_DIR}", &ctx),
            DEFAULT_AUTOMATION_DIR
        );
        assert_eq!(
            substitute("{AUTOMATION_ID}", &ctx),
            section.automation_token()
        );

        project.automation_directory = Some("out/auto".to_string());
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(substitute("{AUTOMATION_DIR}", &ctx), "out/auto");
    }

    #[test]
    fn test_existing_features_and_descriptions() {
        let mut project = context_project();
        project.previous_case_output = Some("carried over".to_string());
        project.user_description = Some("project-level description".to_string());

        let mut section = Section::new("x", "x");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(substitute("{EXISTING_FEATURES}", &ctx), "carried over");
        assert_eq!(
            substitute("{USER_DESCRIPTION}", &ctx),
            "project-level description"
        );
        assert_eq!(substitute("{VTT_TRANSCRIPT}", &ctx), "");

        // Section-level field wins over the project-level one.
        section.user_description = Some("section override".to_string());
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(substitute("{USER_DESCRIPTION}", &ctx), "section override");
    }

    #[test]
    fn test_process_step_triggers_exclude_self() {
        let project = context_project();
        let section = Section::new("x", "x");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };
        assert_eq!(
            substitute("{PROCESS_STEP_TRIGGERS}", &ctx),
            "validation, refinement, integration"
        );

        let mut process = Section::new("x-validation", "validation");
        process.is_process_step = true;
        process.process_step_type = Some(ProcessStepKind::Validation);
        let ctx = PlaceholderContext {
            project: &project,
            section: &process,
            input: None,
        };
        assert_eq!(substitute("{PROCESS_STEP_TRIGGERS}", &ctx), "none");
    }

    #[test]
    fn test_workflow_context() {
        let project = context_project();
        let section = project.section("data-models").unwrap();
        let ctx = PlaceholderContext {
            project: &project,
            section,
            input: None,
        };

        assert_eq!(
            substitute("{WORKFLOW_CONTEXT}", &ctx),
            "Step 3 of 7: data-models"
        );
    }

    #[test]
    fn test_named_outputs() {
        let project = context_project();
        let section = Section::new("x", "x");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        assert_eq!(substitute("{UX_SPECIFICATIONS}", &ctx), "ux output");
        // Present but empty output: token stays.
        assert_eq!(
            substitute("{DATA_MODELS_OUTPUT}", &ctx),
            "{DATA_MODELS_OUTPUT}"
        );
    }

    #[test]
    fn test_legacy_reference_resolution() {
        let project = context_project();
        let section = Section::new("x", "x");
        let ctx = PlaceholderContext {
            project: &project,
            section: &section,
            input: None,
        };

        // Numeric references map through the canonical chain.
        assert_eq!(
            substitute("[OUTPUT_FROM_SECTION_1]", &ctx),
            "brief output"
        );
        // Direct-id references also resolve.
        assert_eq!(
            substitute("[OUTPUT_FROM_SECTION_ux-specifications]", &ctx),
            "ux output"
        );
        // Unresolved references rewrite to an explicit marker.
        assert_eq!(
            substitute("[OUTPUT_FROM_SECTION_3]", &ctx),
            "[OUTPUT_FROM_SECTION_3: NOT FOUND]"
        );
        assert_eq!(
            substitute("[OUTPUT_FROM_SECTION_nope]", &ctx),
            "[OUTPUT_FROM_SECTION_nope: NOT FOUND]"
        );
    }

    #[test]
    fn test_input_sources_table() {
        assert_eq!(
            input_sources_description(1, false),
            "User-provided project description"
        );
        assert_eq!(
            input_sources_description(4, false),
            "Prior case output carried forward"
        );
        assert!(input_sources_description(2, true).ends_with("enhancement notes"));
    }
}
