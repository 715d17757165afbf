//! SQLite-backed task store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ranksys_core::{Task, TaskId, TaskStatus, TaskType};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{apply_update, empty_counts, StoreError, TaskStore};

const TASK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    task_id    TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    record     TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_expires_at ON tasks(expires_at);
"#;

/// Durable store. Each record is the JSON-encoded [`Task`] plus an expiry
/// timestamp (unix milliseconds).
#[derive(Clone)]
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
    ttl_ms: i64,
}

impl SqliteTaskStore {
    /// Open a file-backed store.
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, ttl)
    }

    /// Create an in-memory store (for testing).
    pub fn memory(ttl: Duration) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Result<Self, StoreError> {
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");
        conn.execute_batch(TASK_SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
        })
    }

    fn expiry(&self) -> i64 {
        Utc::now().timestamp_millis().saturating_add(self.ttl_ms)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task panicked: {}", e)))?
    }
}

fn load(conn: &Connection, task_id: &str, now: i64) -> Result<Option<Task>, StoreError> {
    let record: Option<String> = conn
        .query_row(
            "SELECT record FROM tasks WHERE task_id = ?1 AND expires_at > ?2",
            params![task_id, now],
            |row| row.get(0),
        )
        .optional()?;
    record
        .map(|r| serde_json::from_str(&r).map_err(StoreError::from))
        .transpose()
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(
        &self,
        task_type: TaskType,
        request_data: Value,
        webhook_url: Option<String>,
    ) -> Result<Task, StoreError> {
        let task = Task::new(task_type, request_data, webhook_url);
        let record = serde_json::to_string(&task)?;
        let expires_at = self.expiry();
        let task_id = task.task_id.to_string();
        let status = task.status.as_str();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (task_id, status, record, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, status, record, expires_at],
            )?;
            Ok(())
        })
        .await?;

        info!(task_id = %task.task_id, task_type = %task_type, "Task created");
        Ok(task)
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StoreError> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| load(conn, &task_id, Utc::now().timestamp_millis()))
            .await
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Option<Task>, StoreError> {
        let id = task_id.to_string();
        let expires_at = self.expiry();

        let updated = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut task) = load(&tx, &id, Utc::now().timestamp_millis())? else {
                    return Ok(None);
                };

                apply_update(&mut task, status, result, error)?;
                tx.execute(
                    "UPDATE tasks SET status = ?2, record = ?3, expires_at = ?4 WHERE task_id = ?1",
                    params![id, task.status.as_str(), serde_json::to_string(&task)?, expires_at],
                )?;
                tx.commit()?;
                Ok(Some(task))
            })
            .await?;

        if updated.is_none() {
            warn!(task_id = %task_id, status = %status, "Update for unknown task ignored");
        }
        Ok(updated)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let purged = self
            .with_conn(|conn| {
                let now = Utc::now().timestamp_millis();
                Ok(conn.execute("DELETE FROM tasks WHERE expires_at <= ?1", params![now])?)
            })
            .await?;
        debug!(purged = purged, "Purged expired task records");
        Ok(purged)
    }

    async fn count_by_status(&self) -> Result<BTreeMap<TaskStatus, usize>, StoreError> {
        let rows: Vec<(String, i64)> = self
            .with_conn(|conn| {
                let now = Utc::now().timestamp_millis();
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM tasks WHERE expires_at > ?1 GROUP BY status",
                )?;
                let rows = stmt
                    .query_map(params![now], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut counts = empty_counts();
        for (status, count) in rows {
            if let Some(status) = TaskStatus::ALL.iter().find(|s| s.as_str() == status) {
                counts.insert(*status, usize::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }

    fn is_durable(&self) -> bool {
        true
    }
}
