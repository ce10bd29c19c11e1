//! Reference-document injection rules.
//!
//! Each step role receives a fixed set of handbook parts. Philosophically
//! framed steps receive nothing: software/UI terminology must not bleed
//! into them. Parts render under their own heading with a horizontal-rule
//! separator and land immediately before the prompt's `Output Format` or
//! `Quality Criteria` section when one exists.

use crate::project::{ProcessStepKind, Section};
use crate::template::reference::{extract_part, table_of_contents};
use crate::template::ReferenceCatalog;

/// Steps framed philosophically rather than technically.
pub const PHILOSOPHICAL_STEPS: [&str; 4] = [
    "product-vision",
    "guiding-principles",
    "user-narrative",
    "design-philosophy",
];

/// Named parts of the handbook reference document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePart {
    Terminology,
    FeatureTaxonomy,
    ValidationChecklist,
}

impl ReferencePart {
    /// All parts, in document order.
    pub const ALL: [ReferencePart; 3] = [
        ReferencePart::Terminology,
        ReferencePart::FeatureTaxonomy,
        ReferencePart::ValidationChecklist,
    ];

    /// The heading under which the part appears in the handbook.
    pub fn heading(self) -> &'static str {
        match self {
            ReferencePart::Terminology => "Terminology",
            ReferencePart::FeatureTaxonomy => "Feature Taxonomy",
            ReferencePart::ValidationChecklist => "Validation Checklist",
        }
    }
}

/// Role a step plays for reference selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepRole {
    Philosophical,
    FinalSpecification,
    Validation,
    Extraction,
    Generic,
}

fn role_of(section: &Section) -> StepRole {
    let step = section.step_name.as_str();

    if PHILOSOPHICAL_STEPS.contains(&step) {
        return StepRole::Philosophical;
    }
    if step == "final-specification" {
        return StepRole::FinalSpecification;
    }
    if section.process_step_type == Some(ProcessStepKind::Validation)
        || step.contains("validation")
        || step.contains("review")
    {
        return StepRole::Validation;
    }
    if step == "atomic-features" || step.contains("extraction") || step.contains("classification") {
        return StepRole::Extraction;
    }
    StepRole::Generic
}

/// The handbook parts relevant to a step.
pub fn parts_for(section: &Section) -> Vec<ReferencePart> {
    match role_of(section) {
        StepRole::Philosophical => Vec::new(),
        StepRole::FinalSpecification => ReferencePart::ALL.to_vec(),
        StepRole::Validation => vec![
            ReferencePart::Terminology,
            ReferencePart::ValidationChecklist,
        ],
        StepRole::Extraction => vec![
            ReferencePart::Terminology,
            ReferencePart::FeatureTaxonomy,
        ],
        StepRole::Generic => vec![ReferencePart::Terminology],
    }
}

/// Splices relevant handbook excerpts into an assembled prompt.
///
/// Generic steps that received at least one part additionally get a
/// table-of-contents summary of the full document.
pub async fn splice_references(
    prompt: &str,
    section: &Section,
    catalog: &ReferenceCatalog,
) -> String {
    let parts = parts_for(section);
    if parts.is_empty() {
        return prompt.to_string();
    }

    let Some(document) = catalog.get_document("handbook").await else {
        return prompt.to_string();
    };

    let mut block = String::new();
    let mut used = 0;
    for part in &parts {
        if let Some(body) = extract_part(&document, part.heading()) {
            block.push_str(&format!("## {}\n\n{}\n\n---\n\n", part.heading(), body));
            used += 1;
        }
    }

    if used > 0 && role_of(section) == StepRole::Generic {
        block.push_str(&format!(
            "## Reference Contents\n\n{}\n\n---\n\n",
            table_of_contents(&document)
        ));
    }

    if block.is_empty() {
        return prompt.to_string();
    }

    insert_block(prompt, &block)
}

/// Inserts a block immediately before the first `Output Format` or
/// `Quality Criteria` heading line, or appends it at the end.
fn insert_block(prompt: &str, block: &str) -> String {
    let mut offset = 0;
    for line in prompt.split_inclusive('\n') {
        let heading = line.trim_start_matches('#').trim_start();
        if heading.starts_with("Output Format") || heading.starts_with("Quality Criteria") {
            let mut result = String::with_capacity(prompt.len() + block.len());
            result.push_str(&prompt[..offset]);
            result.push_str(block);
            result.push_str(&prompt[offset..]);
            return result;
        }
        offset += line.len();
    }

    let mut result = prompt.trim_end().to_string();
    result.push_str("\n\n");
    result.push_str(block);
    result
}
