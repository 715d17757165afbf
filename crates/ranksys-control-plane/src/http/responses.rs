//! HTTP request and response types.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use ranksys_core::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::runner::{RunnerError, Submission};
use crate::service::ServiceError;

// ============================================================================
// Async submission types
// ============================================================================

/// Body of an async endpoint: the synchronous request plus a webhook.
#[derive(Debug, Deserialize)]
pub struct AsyncRequest<T> {
    #[serde(flatten)]
    pub request: T,

    /// Where to POST the completion notification.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

/// Response body for every async submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<Submission> for SubmitResponse {
    fn from(submission: Submission) -> Self {
        Self {
            message: format!("{} task submitted", submission.task_type),
            task_id: submission.task_id,
            status: submission.status,
            created_at: submission.created_at,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// API errors with HTTP status codes and `{"detail": ...}` bodies.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed body or a request that fails validation.
    Validation { message: String },
    /// No task with this id (or it expired).
    TaskNotFound { task_id: TaskId },
    /// Result requested before the task reached a terminal state.
    TaskNotReady { task_id: TaskId, status: TaskStatus },
    /// The task ran and failed.
    TaskFailed { message: String },
    /// A synchronous ranking call failed.
    Ranking { message: String },
    /// Internal server error.
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { message } => {
                (StatusCode::BAD_REQUEST, json!({ "detail": message }))
            }
            ApiError::TaskNotFound { task_id } => (
                StatusCode::NOT_FOUND,
                json!({ "detail": format!("Task {} not found", task_id) }),
            ),
            ApiError::TaskNotReady { task_id, status } => (
                StatusCode::ACCEPTED,
                json!({
                    "detail": format!("Task {} is still {}", task_id, status),
                    "task_id": task_id,
                    "status": status,
                }),
            ),
            ApiError::TaskFailed { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "detail": message }),
            ),
            ApiError::Ranking { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "detail": format!("Ranking failed: {}", message) }),
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "detail": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation {
            message: rejection.body_text(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => ApiError::Validation { message },
            ServiceError::Oracle(e) => ApiError::Ranking {
                message: e.to_string(),
            },
            ServiceError::Internal(message) => ApiError::Internal { message },
        }
    }
}

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::InvalidInput(message) => ApiError::Validation { message },
            other => ApiError::Internal {
                message: other.to_string(),
            },
        }
    }
}
