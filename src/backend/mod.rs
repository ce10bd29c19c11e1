//! Execution backend interface.
//!
//! The engine consumes the backend through a narrow request/response
//! contract: one call per section, taking the assembled prompt and the
//! scope directory, returning success plus output text. The HTTP client
//! sets no request timeout; timeout semantics belong to the backend.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// A single execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Assembled instruction text.
    pub prompt: String,
    /// Directory the backend operates in; opaque to the engine.
    pub scope_directory: String,
}

impl ExecutionRequest {
    pub fn new(prompt: impl Into<String>, scope_directory: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            scope_directory: scope_directory.into(),
        }
    }
}

/// Response from an execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResponse {
    /// A successful response carrying `output`.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// A failure response carrying an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Trait for execution backends.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Executes an assembled prompt. Transport-level failures are errors;
    /// a response with `success == false` is returned as-is for the caller
    /// to interpret.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, BackendError>;
}

/// HTTP client for the execution backend.
pub struct HttpBackendClient {
    base_url: String,
    http_client: Client,
}

impl HttpBackendClient {
    /// Creates a client against `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: Client::builder()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Get the backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, BackendError> {
        let url = format!("{}/execute", self.base_url.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<ExecutionResponse>()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }
}

/// Best-effort sink for produced section outputs.
///
/// Save failures never affect a run's outcome; callers log and move on.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Writes `output` to a file derived from the automation directory and
    /// the section's step name, returning the path written.
    async fn save(
        &self,
        automation_dir: &str,
        step_name: &str,
        automation_id: &str,
        output: &str,
    ) -> std::io::Result<PathBuf>;
}

/// Filesystem-backed output writer.
#[derive(Debug, Default)]
pub struct FsOutputWriter;

impl FsOutputWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputWriter for FsOutputWriter {
    async fn save(
        &self,
        automation_dir: &str,
        step_name: &str,
        automation_id: &str,
        output: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = PathBuf::from(automation_dir);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}-{}.md", step_name, automation_id));
        tokio::fs::write(&path, output).await?;
        Ok(path)
    }
}
