//! Task lifecycle store.
//!
//! Records are keyed by task id and expire after a fixed TTL. Two backends
//! exist: SQLite (durable, shared between processes using the same file)
//! and an in-memory map used when no database is configured.

mod memory;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ranksys_core::{CoreError, Task, TaskId, TaskStatus, TaskType};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Task record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Keyed task records with TTL.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a pending task and return the stored record.
    async fn create_task(
        &self,
        task_type: TaskType,
        request_data: Value,
        webhook_url: Option<String>,
    ) -> Result<Task, StoreError>;

    /// Fetch a task. Expired records are reported as missing.
    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Move a task to `status`.
    ///
    /// Returns the updated record, or `None` when the task is unknown (the
    /// update is then a logged no-op). Transitions out of a terminal state
    /// are rejected.
    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Option<Task>, StoreError>;

    /// Drop expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Live task count per status; every status is present.
    async fn count_by_status(&self) -> Result<BTreeMap<TaskStatus, usize>, StoreError>;

    /// Whether records survive a process restart.
    fn is_durable(&self) -> bool;
}

/// Pick the backend for `config`.
pub fn build_store(config: &Config) -> Result<Arc<dyn TaskStore>, StoreError> {
    match &config.database_path {
        Some(path) => {
            let store = SqliteTaskStore::open(path, config.task_ttl)?;
            info!(path = %path.display(), "Using SQLite task store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No database configured, task records are kept in memory only");
            Ok(Arc::new(MemoryTaskStore::new(config.task_ttl)))
        }
    }
}

/// Apply a status change to a loaded record, logging the outcome.
pub(crate) fn apply_update(
    task: &mut Task,
    status: TaskStatus,
    result: Option<Value>,
    error: Option<String>,
) -> Result<(), StoreError> {
    let from = task.status;
    match task.transition(status, result, error) {
        Ok(()) => {
            info!(
                task_id = %task.task_id,
                task_type = %task.task_type,
                from = %from,
                to = %status,
                "Task status updated"
            );
            Ok(())
        }
        Err(CoreError::InvalidStateTransition { .. }) => {
            warn!(
                task_id = %task.task_id,
                from = %from,
                to = %status,
                "Rejected task status transition"
            );
            Err(StoreError::InvalidTransition {
                task_id: task.task_id.clone(),
                from,
                to: status,
            })
        }
        Err(other) => Err(StoreError::Backend(other.to_string())),
    }
}

pub(crate) fn empty_counts() -> BTreeMap<TaskStatus, usize> {
    TaskStatus::ALL.iter().map(|s| (*s, 0)).collect()
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share.

    use super::*;
    use serde_json::json;

    pub async fn lifecycle(store: &dyn TaskStore) {
        let task = store
            .create_task(TaskType::Rank, json!({"task_description": "x"}), None)
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());

        let fetched = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched, task);

        store
            .update_status(&task.task_id, TaskStatus::Processing, None, None)
            .await
            .unwrap();
        let done = store
            .update_status(&task.task_id, TaskStatus::Completed, Some(json!({"r": 1})), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let fetched = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.result, Some(json!({"r": 1})));
        assert!(fetched.completed_at.is_some());

        let err = store
            .update_status(&task.task_id, TaskStatus::Failed, None, Some("late".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let fetched = store.get_task(&task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert!(fetched.error.is_none());
    }

    pub async fn unknown_update_is_noop(store: &dyn TaskStore) {
        let missing = TaskId::new("does-not-exist");
        let updated = store
            .update_status(&missing, TaskStatus::Processing, None, None)
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(store.get_task(&missing).await.unwrap().is_none());
    }

    pub async fn counts(store: &dyn TaskStore) {
        let a = store
            .create_task(TaskType::BatchRun, json!({}), None)
            .await
            .unwrap();
        store
            .create_task(TaskType::Rank, json!({}), Some("http://hook".into()))
            .await
            .unwrap();
        store
            .update_status(&a.task_id, TaskStatus::Failed, None, None)
            .await
            .unwrap();

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts[&TaskStatus::Pending], 1);
        assert_eq!(counts[&TaskStatus::Failed], 1);
        assert_eq!(counts[&TaskStatus::Completed], 0);
        assert_eq!(counts.len(), 4);
    }
}
