//! Prompt assembly.
//!
//! The assembler turns a section plus its project state into the exact
//! instruction text sent to the execution backend: base template selection,
//! modifier injection, prompt-body extraction, specialized fragments,
//! placeholder substitution, and reference splicing.

pub mod placeholders;
pub mod references;

pub use placeholders::{substitute, PlaceholderContext};

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::pipeline::input::SEPARATOR;
use crate::project::{Project, Section};
use crate::template::{ReferenceCatalog, TemplateStore};

/// Placeholder inside core templates where modifier fragments land.
pub const MODIFIER_TOKEN: &str = "{ADDITIONAL_INSTRUCTIONS}";

/// Heading under which a specialized fragment is appended.
pub const SPECIALIZED_HEADING: &str = "## Specialized Instructions";

/// Options controlling a single assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyOptions<'a> {
    /// Value substituted for `{USER_INPUT}`/`{INPUT}`. `None` leaves those
    /// tokens in place; runs and explicit copy actions pass the derived
    /// input here.
    pub input: Option<&'a str>,
    /// Whether reference-document excerpts are spliced in.
    pub include_references: bool,
}

/// Assembles backend instruction text from templates and project state.
pub struct PromptAssembler {
    templates: Arc<TemplateStore>,
    references: Arc<ReferenceCatalog>,
}

impl PromptAssembler {
    pub fn new(templates: Arc<TemplateStore>, references: Arc<ReferenceCatalog>) -> Self {
        Self {
            templates,
            references,
        }
    }

    /// Assembles the instruction text for a section.
    ///
    /// Returns `None` when the selected base template cannot be resolved;
    /// the caller must not execute the section in that case. Every other
    /// absence (modifier, specialized fragment, reference document) is
    /// non-fatal. Assembling the same section twice against unchanged
    /// project state yields identical text.
    pub async fn assemble(
        &self,
        section: &Section,
        project: &Project,
        options: &AssemblyOptions<'_>,
    ) -> Option<String> {
        let base = self.base_template(section).await?;

        let template = if section.is_process_step || section.is_inference_step {
            base
        } else {
            self.inject_modifiers(&base, section).await
        };

        let mut body = extract_prompt_body(&template);

        if let Some(name) = &section.specialized {
            match self.templates.load_specialized_prompt(name).await {
                Some(fragment) => {
                    body.push_str("\n\n");
                    body.push_str(SPECIALIZED_HEADING);
                    body.push_str("\n\n");
                    body.push_str(&fragment);
                }
                None => {
                    debug!(section = %section.section_id, specialized = %name,
                        "specialized fragment not found, proceeding without it");
                }
            }
        }

        let ctx = PlaceholderContext {
            project,
            section,
            input: options.input,
        };
        let mut prompt = substitute(&body, &ctx);

        if options.include_references {
            prompt = references::splice_references(&prompt, section, &self.references).await;
        }

        Some(prompt)
    }

    /// Selects the base template for a section: process-step template,
    /// else inference-step template, else the core step template.
    async fn base_template(&self, section: &Section) -> Option<String> {
        if section.is_process_step {
            let Some(kind) = section.process_step_type else {
                warn!(section = %section.section_id,
                    "process step without a process_step_type, treating template as absent");
                return None;
            };
            return self.templates.load_process_step(kind).await;
        }
        if section.is_inference_step {
            return self.templates.load_inference_step().await;
        }
        self.templates.load_core_step(&section.step_name).await
    }

    /// Replaces the modifier placeholder with the section's requested
    /// fragments, joined by a horizontal rule, in declared order. Names
    /// with no matching fragment are skipped; with nothing to inject the
    /// placeholder is removed.
    async fn inject_modifiers(&self, template: &str, section: &Section) -> String {
        if !template.contains(MODIFIER_TOKEN) {
            return template.to_string();
        }

        let mut fragments = Vec::new();
        for name in &section.modifiers {
            match self.templates.load_modifier(&section.step_name, name).await {
                Some(fragment) => fragments.push(fragment),
                None => {
                    debug!(section = %section.section_id, modifier = %name,
                        "modifier fragment not found, skipping");
                }
            }
        }

        template.replace(MODIFIER_TOKEN, &fragments.join(SEPARATOR))
    }
}

fn fenced_body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Prompt:\s*```[a-zA-Z]*\n(.*?)```").expect("valid pattern")
    })
}

fn marker_body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Prompt:\s*(.*?)\n\s*Output Format:").expect("valid pattern"))
}

/// Extracts the canonical prompt body from a structured template.
///
/// The template format embeds the usable instruction between a `Prompt:`
/// marker and either a closing code fence or an `Output Format:` marker.
/// When neither pattern matches, the full template text is used verbatim.
pub fn extract_prompt_body(template: &str) -> String {
    if let Some(caps) = fenced_body_regex().captures(template) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = marker_body_regex().captures(template) {
        return caps[1].trim().to_string();
    }
    template.trim().to_string()
}
