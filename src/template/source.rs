//! Fetch seam for template and reference content.
//!
//! The store composes candidate roots with logical relative paths and asks
//! a `TemplateSource` for each concrete path. Production uses the
//! filesystem; tests and embedders can provide an in-memory map.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// A source of raw template text, addressed by concrete path.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Fetches the content at `path`. A failed fetch is an ordinary
    /// outcome, not an exceptional one: callers fall through to the next
    /// candidate path.
    async fn fetch(&self, path: &Path) -> io::Result<String>;
}

/// Filesystem-backed source; paths resolve relative to the process working
/// directory unless absolute.
#[derive(Debug, Default)]
pub struct DirSource;

impl DirSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TemplateSource for DirSource {
    async fn fetch(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// In-memory source keyed by exact path.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file at `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn fetch(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}
