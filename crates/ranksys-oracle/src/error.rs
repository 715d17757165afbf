//! Error types for the ranking oracle.

use thiserror::Error;

/// Errors that can occur while asking the oracle for a decision.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Network-level failure talking to the oracle endpoint.
    #[error("Oracle transport error: {0}")]
    Transport(String),

    /// The oracle endpoint answered with a non-success status.
    #[error("Oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The oracle call exceeded its timeout.
    #[error("Timeout waiting for oracle response")]
    Timeout,

    /// The oracle answered, but the answer could not be decoded or validated.
    #[error("Oracle output error: {0}")]
    Output(String),

    /// The request itself is unusable; retrying will not help.
    #[error("Invalid oracle input: {0}")]
    InvalidInput(String),
}

impl OracleError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }

    /// True for decode/validation failures (as opposed to transport ones).
    pub fn is_output_error(&self) -> bool {
        matches!(self, Self::Output(_))
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Output(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Output(format!("invalid JSON: {}", e))
    }
}
