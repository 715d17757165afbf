//! ranksys Core Domain Types
//!
//! This crate contains the domain model shared by every ranksys component:
//! - Candidates, scenarios and ranking decisions
//! - Batch aggregation (pure, deterministic)
//! - Task records and their lifecycle rules
//! - The retry combinator used around every outbound call
//!
//! Nothing here talks to the network or to storage.

pub mod batch;
pub mod candidate;
pub mod error;
pub mod ids;
pub mod retry;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use batch::{BatchResult, RankingDecision, Scenario, ScenarioResult, ERROR_WINNER};
pub use candidate::{Candidate, CandidateInfo};
pub use error::CoreError;
pub use ids::{SessionId, TaskId};
pub use retry::{Backoff, RetryPolicy};
pub use status::{TaskStatus, TaskType};
pub use task::Task;
