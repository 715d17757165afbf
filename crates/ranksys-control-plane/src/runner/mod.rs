//! Orchestration bindings.
//!
//! Callers submit a [`Job`] and poll by task id; whether the job runs as a
//! deferred task in this process or as a workflow execution on the activity
//! pool is hidden behind [`BatchRunner`].

pub(crate) mod in_process;
mod workflow;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ranksys_core::{Task, TaskId, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinError;

use crate::service::{
    BatchRunRequest, BatchTestRequest, GenerateScenariosRequest, RankRequest, RankUrlsRequest,
    RankingService, ServiceError,
};
use crate::store::StoreError;

pub use in_process::InProcessRunner;
pub use workflow::{ActivityOptions, WorkflowRunner, DEFAULT_ACTIVITY_RETRY};

/// Runner errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Activity failed: {0}")]
    Activity(String),

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Failed to encode task payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A unit of submitted work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", content = "request", rename_all = "snake_case")]
pub enum Job {
    Rank(RankRequest),
    RankUrls(RankUrlsRequest),
    BatchGenerate(GenerateScenariosRequest),
    BatchTest(BatchTestRequest),
    BatchRun(BatchRunRequest),
}

impl Job {
    pub fn task_type(&self) -> TaskType {
        match self {
            Job::Rank(_) => TaskType::Rank,
            Job::RankUrls(_) => TaskType::RankUrls,
            Job::BatchGenerate(_) => TaskType::BatchGenerate,
            Job::BatchTest(_) => TaskType::BatchTest,
            Job::BatchRun(_) => TaskType::BatchRun,
        }
    }

    /// Reject requests that could never run.
    pub fn validate(&self) -> Result<(), RunnerError> {
        let checked = match self {
            Job::Rank(r) => r.validate(),
            Job::RankUrls(r) => r.validate(),
            Job::BatchGenerate(r) => r.validate(),
            Job::BatchTest(r) => r.validate(),
            Job::BatchRun(r) => r.validate(),
        };
        checked.map_err(|e| match e {
            ServiceError::InvalidInput(msg) => RunnerError::InvalidInput(msg),
            other => RunnerError::InvalidInput(other.to_string()),
        })
    }

    /// The request body as stored with the task.
    pub fn request_data(&self) -> Result<Value, RunnerError> {
        let value = match self {
            Job::Rank(r) => serde_json::to_value(r)?,
            Job::RankUrls(r) => serde_json::to_value(r)?,
            Job::BatchGenerate(r) => serde_json::to_value(r)?,
            Job::BatchTest(r) => serde_json::to_value(r)?,
            Job::BatchRun(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }
}

/// Acknowledgement of a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

/// What a poll returns. `result` is present only once completed and
/// `error` only once failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        let completed = task.status == TaskStatus::Completed;
        let failed = task.status == TaskStatus::Failed;
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            status: task.status,
            created_at: task.created_at,
            completed_at: task.completed_at,
            result: task.result.filter(|_| completed),
            error: task.error.filter(|_| failed),
        }
    }
}

/// Submit/poll contract shared by both orchestration bindings.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    /// Accept a job and return immediately with a pending task id.
    async fn submit(&self, job: Job, webhook_url: Option<String>)
        -> Result<Submission, RunnerError>;

    /// Current state of a task, `None` when unknown or expired.
    async fn poll(&self, task_id: &TaskId) -> Result<Option<TaskView>, RunnerError>;

    /// Task count per status; every status is present.
    async fn status_counts(&self) -> Result<BTreeMap<TaskStatus, usize>, RunnerError>;

    /// Drop records past their retention, returning how many went.
    async fn purge_expired(&self) -> Result<usize, RunnerError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Run a job to completion in-process and encode its output.
pub(crate) async fn execute_job(service: &RankingService, job: &Job) -> Result<Value, ServiceError> {
    let value = match job {
        Job::Rank(r) => to_value(service.rank(r).await?)?,
        Job::RankUrls(r) => to_value(service.rank_urls(r).await?)?,
        Job::BatchGenerate(r) => to_value(service.generate_scenarios(r).await?)?,
        Job::BatchTest(r) => to_value(service.run_batch(r).await?)?,
        Job::BatchRun(r) => to_value(service.batch_run(r).await?)?,
    };
    Ok(value)
}

/// Failure text for a job task that panicked or was cancelled.
pub(crate) fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("Task aborted: {}", e);
    }
    let payload = e.into_panic();
    let text = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Task panicked: {}", text)
}

pub(crate) fn to_value<T: Serialize>(value: T) -> Result<Value, ServiceError> {
    serde_json::to_value(value)
        .map_err(|e| ServiceError::Internal(format!("unencodable result: {}", e)))
}

/// Shared handle type held by the HTTP state.
pub type SharedRunner = Arc<dyn BatchRunner>;

#[cfg(test)]
mod tests {
    use super::*;
    use ranksys_core::Candidate;
    use serde_json::json;

    #[test]
    fn test_job_wire_format() {
        let job = Job::Rank(RankRequest {
            task_description: "x".into(),
            candidates: vec![Candidate::new("a", "A")],
        });
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["task_type"], "rank");
        assert_eq!(value["request"]["task_description"], "x");

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_view_hides_result_until_completed() {
        let mut task = Task::new(TaskType::Rank, json!({}), None);
        task.result = Some(json!({"stale": true}));
        let view = TaskView::from(task);
        assert!(view.result.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("completed_at").is_none());
    }

    #[test]
    fn test_invalid_job_is_rejected() {
        let job = Job::BatchRun(BatchRunRequest {
            candidates: vec![],
            num_scenarios: 5,
            custom_query: None,
            session_id: None,
        });
        assert!(matches!(job.validate(), Err(RunnerError::InvalidInput(_))));
    }
}
