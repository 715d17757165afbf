//! Task status handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use ranksys_core::{TaskId, TaskStatus};
use serde_json::Value;

use crate::http::responses::ApiError;
use crate::runner::TaskView;
use crate::state::AppState;

/// GET /api/v1/tasks/:task_id
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(lookup(&state, TaskId::new(task_id)).await?))
}

/// GET /api/v1/tasks/:task_id/result
pub async fn get_task_result(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let view = lookup(&state, TaskId::new(task_id)).await?;

    match view.status {
        TaskStatus::Completed => Ok(Json(view.result.unwrap_or(Value::Null))),
        TaskStatus::Failed => Err(ApiError::TaskFailed {
            message: view.error.unwrap_or_else(|| "Task failed".to_string()),
        }),
        status => Err(ApiError::TaskNotReady {
            task_id: view.task_id,
            status,
        }),
    }
}

async fn lookup(state: &AppState, task_id: TaskId) -> Result<TaskView, ApiError> {
    match state.runner.poll(&task_id).await? {
        Some(view) => Ok(view),
        None => Err(ApiError::TaskNotFound { task_id }),
    }
}
