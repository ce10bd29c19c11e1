//! Template loading and caching.
//!
//! The store resolves logical template names (core steps, modifier
//! fragments, process steps, specialized prompts) against an ordered list
//! of candidate roots, memoizing every lookup for the process lifetime.
//! Absence is a first-class outcome: a template that resolves under no
//! root yields `None`, is cached as such, and is logged once.

pub mod reference;
pub mod source;

pub use reference::ReferenceCatalog;
pub use source::{DirSource, MemorySource, TemplateSource};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::project::ProcessStepKind;

/// Cached template store.
///
/// Loads are idempotent and side-effect-free from the caller's
/// perspective: repeated calls for the same logical path return the cached
/// value without re-fetching. The cache lock is held across the fetch so a
/// given logical path is fetched at most once, even under concurrent use.
pub struct TemplateStore {
    source: Arc<dyn TemplateSource>,
    roots: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<String>>>,
    preloaded: OnceCell<usize>,
}

impl TemplateStore {
    /// Creates a store over `source`, trying `roots` in order for every
    /// fetch.
    pub fn new(source: Arc<dyn TemplateSource>, roots: Vec<PathBuf>) -> Self {
        Self {
            source,
            roots,
            cache: Mutex::new(HashMap::new()),
            preloaded: OnceCell::new(),
        }
    }

    /// Loads the core template for a step.
    pub async fn load_core_step(&self, step_name: &str) -> Option<String> {
        self.load(&format!("steps/{}.md", step_name)).await
    }

    /// Loads the shared inference-step template.
    pub async fn load_inference_step(&self) -> Option<String> {
        self.load("steps/inference.md").await
    }

    /// Loads a modifier fragment for a step.
    pub async fn load_modifier(&self, step_name: &str, modifier: &str) -> Option<String> {
        self.load(&format!("modifiers/{}/{}.md", step_name, modifier))
            .await
    }

    /// Loads a process-step template by kind.
    pub async fn load_process_step(&self, kind: ProcessStepKind) -> Option<String> {
        self.load(&format!("process/{}.md", kind.as_str())).await
    }

    /// Loads a specialized prompt fragment.
    ///
    /// A name containing a path separator is used as-is; a bare name maps
    /// to `specialized/{name}.md`.
    pub async fn load_specialized_prompt(&self, name_or_path: &str) -> Option<String> {
        let logical = if name_or_path.contains('/') {
            name_or_path.to_string()
        } else {
            format!("specialized/{}.md", name_or_path)
        };
        self.load(&logical).await
    }

    /// Bulk-preloads core step templates.
    ///
    /// At most one preload pass executes per store; concurrent callers
    /// await the in-flight pass instead of starting a duplicate. Returns
    /// the number of templates the pass resolved.
    pub async fn preload(&self, step_names: &[&str]) -> usize {
        *self
            .preloaded
            .get_or_init(|| async {
                let mut loaded = 0;
                for step in step_names {
                    if self.load_core_step(step).await.is_some() {
                        loaded += 1;
                    }
                }
                debug!(requested = step_names.len(), loaded, "template preload pass finished");
                loaded
            })
            .await
    }

    /// Resolves a logical relative path through the candidate roots.
    async fn load(&self, logical: &str) -> Option<String> {
        let mut cache = self.cache.lock().await;
        if let Some(hit) = cache.get(logical) {
            return hit.clone();
        }

        let mut found = None;
        for root in &self.roots {
            let candidate = root.join(logical);
            match self.source.fetch(&candidate).await {
                Ok(text) => {
                    debug!(path = %candidate.display(), "template resolved");
                    found = Some(text);
                    break;
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "candidate fetch failed");
                }
            }
        }

        if found.is_none() {
            warn!(path = logical, "template resolved under no candidate root");
        }

        cache.insert(logical.to_string(), found.clone());
        found
    }
}
