//! Error types for the CLI client.

use thiserror::Error;

/// Errors that can occur when talking to the control plane.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected the request.
    #[error("HTTP {status}: {detail}")]
    Api { status: u16, detail: String },

    /// Task not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Task finished with an error.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Gave up waiting for a task.
    #[error("timed out waiting for task {0}")]
    Timeout(String),

    /// Failed to read an input file.
    #[error("failed to read {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
