//! Section input derivation.
//!
//! Before a section executes, its input is derived with a fixed priority:
//! explicit user input, then declared dependency outputs, then the
//! positional predecessor's output, then empty.

use crate::project::{graph, Project, Section};

/// Horizontal-rule separator placed between joined outputs.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Joins the outputs of a section's declared dependencies in declared
/// order. Dependencies that do not exist in the project or have no output
/// yet are skipped silently.
pub fn joined_dependency_outputs(project: &Project, section: &Section) -> String {
    section
        .dependencies
        .iter()
        .filter_map(|id| project.section(id))
        .map(|dep| dep.output.as_str())
        .filter(|output| !output.is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Derives the input text for a section.
///
/// Priority: (1) non-empty user-supplied input verbatim; (2) declared
/// dependency outputs joined by [`SEPARATOR`]; (3) the immediately
/// preceding section's output; (4) empty. Absence at every level is an
/// ordinary outcome, not an error.
pub fn derive_input(project: &Project, section: &Section) -> String {
    if !section.input.trim().is_empty() {
        return section.input.clone();
    }

    if !section.dependencies.is_empty() {
        return joined_dependency_outputs(project, section);
    }

    graph::previous_section(project, &section.section_id)
        .map(|prev| prev.output.clone())
        .unwrap_or_default()
}
