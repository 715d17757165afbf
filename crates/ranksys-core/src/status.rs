//! Status enums for Tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an asynchronously submitted Task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task accepted but execution has not started.
    #[default]
    Pending,
    /// Task is executing.
    Processing,
    /// Task finished and carries a result.
    Completed,
    /// Task finished with an error.
    Failed,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal lifecycle edge.
    ///
    /// Terminal states have no outgoing edges. A pending task may fail
    /// before it ever starts processing, but it cannot complete without
    /// processing.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a Task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Single ranking decision over supplied candidates.
    Rank,
    /// Ranking decision over candidates synthesized from URLs.
    RankUrls,
    /// Scenario generation only.
    BatchGenerate,
    /// Batch evaluation over supplied scenarios.
    BatchTest,
    /// Scenario generation followed by batch evaluation.
    BatchRun,
}

impl TaskType {
    /// Wire name of the task type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::RankUrls => "rank_urls",
            Self::BatchGenerate => "batch_generate",
            Self::BatchTest => "batch_test",
            Self::BatchRun => "batch_run",
        }
    }

    /// Prefix used for workflow ids of this task type.
    pub fn workflow_prefix(&self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::RankUrls => "rank-urls",
            Self::BatchGenerate => "batch-generate",
            Self::BatchTest => "batch-test",
            Self::BatchRun => "batch-run",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
