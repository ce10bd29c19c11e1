//! Reference document catalog.
//!
//! A small set of large reference documents is loaded lazily, once, and
//! shared read-only across runs. Named parts are extracted by heading for
//! selective inclusion in assembled prompts; oversized parts are truncated
//! at a fixed, deterministic point with an explicit marker.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::source::TemplateSource;

/// Keys of the documents the catalog knows about.
pub const CATALOG_KEYS: [&str; 2] = ["handbook", "style-guide"];

/// Maximum characters an extracted part may carry before truncation.
pub const MAX_PART_LEN: usize = 8000;

/// Marker appended to a truncated part.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Lazily loaded catalog of reference documents.
pub struct ReferenceCatalog {
    source: Arc<dyn TemplateSource>,
    roots: Vec<PathBuf>,
    documents: OnceCell<HashMap<String, String>>,
}

impl ReferenceCatalog {
    /// Creates a catalog over `source`, trying `roots` in order.
    pub fn new(source: Arc<dyn TemplateSource>, roots: Vec<PathBuf>) -> Self {
        Self {
            source,
            roots,
            documents: OnceCell::new(),
        }
    }

    /// Gets a reference document by key.
    ///
    /// The full catalog loads on first use; concurrent first callers share
    /// a single load pass. A document that resolves under no root is
    /// simply absent from the catalog.
    pub async fn get_document(&self, key: &str) -> Option<String> {
        let documents = self
            .documents
            .get_or_init(|| async { self.load_all().await })
            .await;
        documents.get(key).cloned()
    }

    async fn load_all(&self) -> HashMap<String, String> {
        let mut documents = HashMap::new();
        for key in CATALOG_KEYS {
            let logical = format!("reference/{}.md", key);
            let mut found = None;
            for root in &self.roots {
                let candidate = root.join(&logical);
                match self.source.fetch(&candidate).await {
                    Ok(text) => {
                        found = Some(text);
                        break;
                    }
                    Err(e) => {
                        debug!(path = %candidate.display(), error = %e, "candidate fetch failed");
                    }
                }
            }
            match found {
                Some(text) => {
                    documents.insert(key.to_string(), text);
                }
                None => warn!(key, "reference document resolved under no candidate root"),
            }
        }
        debug!(loaded = documents.len(), "reference catalog loaded");
        documents
    }
}

/// Extracts a named part from a reference document.
///
/// Matches a `## {heading}` line and captures everything up to the next
/// top-level `## ` heading or the end of the document. Parts longer than
/// [`MAX_PART_LEN`] characters are cut at exactly that length and carry an
/// explicit truncation marker.
pub fn extract_part(document: &str, heading: &str) -> Option<String> {
    let wanted = format!("## {}", heading);
    let mut lines = document.lines();

    loop {
        let line = lines.next()?;
        if line.trim_end() == wanted {
            break;
        }
    }

    let mut part = String::new();
    for line in lines {
        if line.starts_with("## ") {
            break;
        }
        part.push_str(line);
        part.push('\n');
    }

    let part = part.trim().to_string();
    if part.chars().count() > MAX_PART_LEN {
        let mut truncated: String = part.chars().take(MAX_PART_LEN).collect();
        truncated.push_str(TRUNCATION_MARKER);
        return Some(truncated);
    }
    Some(part)
}

/// Builds a table-of-contents summary from a document's `## ` headings.
pub fn table_of_contents(document: &str) -> String {
    document
        .lines()
        .filter_map(|line| line.strip_prefix("## "))
        .map(|heading| format!("- {}", heading.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}
