//! In-memory task store.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ranksys_core::{Task, TaskId, TaskStatus, TaskType};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{apply_update, empty_counts, StoreError, TaskStore};

struct Entry {
    task: Task,
    expires_at: DateTime<Utc>,
}

/// Process-local store. Nothing survives a restart and nothing is visible
/// to other processes.
pub struct MemoryTaskStore {
    entries: RwLock<HashMap<TaskId, Entry>>,
    ttl: chrono::Duration,
}

impl MemoryTaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(
        &self,
        task_type: TaskType,
        request_data: Value,
        webhook_url: Option<String>,
    ) -> Result<Task, StoreError> {
        let task = Task::new(task_type, request_data, webhook_url);
        let entry = Entry {
            task: task.clone(),
            expires_at: self.expiry(),
        };
        self.entries.write().await.insert(task.task_id.clone(), entry);

        info!(task_id = %task.task_id, task_type = %task_type, "Task created");
        Ok(task)
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(task_id)
            .filter(|e| e.expires_at > Utc::now())
            .map(|e| e.task.clone()))
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Option<Task>, StoreError> {
        let expires_at = self.expiry();
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(task_id).filter(|e| e.expires_at > Utc::now()) else {
            warn!(task_id = %task_id, status = %status, "Update for unknown task ignored");
            return Ok(None);
        };

        apply_update(&mut entry.task, status, result, error)?;
        entry.expires_at = expires_at;
        Ok(Some(entry.task.clone()))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let purged = before - entries.len();
        debug!(purged = purged, "Purged expired task records");
        Ok(purged)
    }

    async fn count_by_status(&self) -> Result<BTreeMap<TaskStatus, usize>, StoreError> {
        let now = Utc::now();
        let mut counts = empty_counts();
        for entry in self.entries.read().await.values() {
            if entry.expires_at > now {
                *counts.entry(entry.task.status).or_default() += 1;
            }
        }
        Ok(counts)
    }

    fn is_durable(&self) -> bool {
        false
    }
}
