//! Task record and lifecycle transitions.

use crate::{CoreError, TaskId, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Task tracks one asynchronously submitted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub task_id: TaskId,

    /// What kind of work this task performs.
    pub task_type: TaskType,

    /// Current task status.
    pub status: TaskStatus,

    /// The original request payload.
    pub request_data: Value,

    /// Where to deliver the completion notification, if anywhere.
    pub webhook_url: Option<String>,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,

    /// Result payload (only when completed).
    pub result: Option<Value>,

    /// Error text (only when failed).
    pub error: Option<String>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(task_type: TaskType, request_data: Value, webhook_url: Option<String>) -> Self {
        Self {
            task_id: TaskId::generate(),
            task_type,
            status: TaskStatus::Pending,
            request_data,
            webhook_url,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Builder method to set a specific ID.
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.task_id = id;
        self
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the task to `next`.
    ///
    /// `result` is recorded only on completion and `error` only on failure;
    /// `completed_at` is stamped on either terminal transition. Illegal edges
    /// (including any edge out of a terminal state) leave the task untouched.
    pub fn transition(
        &mut self,
        next: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        self.status = next;
        match next {
            TaskStatus::Completed => {
                self.result = result;
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Failed => {
                self.error = Some(error.unwrap_or_else(|| "Task failed".to_string()));
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending | TaskStatus::Processing => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> Task {
        Task::new(TaskType::Rank, json!({"task_description": "x"}), None)
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = pending();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_complete_sets_result_and_timestamp() {
        let mut task = pending();
        task.transition(TaskStatus::Processing, None, None).unwrap();
        assert!(task.completed_at.is_none());

        task.transition(TaskStatus::Completed, Some(json!({"ok": true})), Some("ignored".into()))
            .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(json!({"ok": true})));
        assert!(task.error.is_none());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut task = pending();
        task.transition(TaskStatus::Processing, None, None).unwrap();
        task.transition(TaskStatus::Failed, None, Some("boom".into()))
            .unwrap();
        let snapshot = task.clone();

        let err = task
            .transition(TaskStatus::Completed, Some(json!(1)), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(task, snapshot);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut task = pending();
        assert!(task
            .transition(TaskStatus::Completed, Some(json!(1)), None)
            .is_err());
        assert_eq!(task.status, TaskStatus::Pending);
    }
}
