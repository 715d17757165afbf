//! HTTP client for the control plane REST API.

use std::time::Duration;

use ranksys_core::TaskStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ClientError;

/// Outcome of fetching a task result.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    /// The task completed with this result.
    Ready(Value),
    /// The task has not finished yet.
    Pending(TaskStatus),
}

/// Async submission acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize)]
struct NotReady {
    status: TaskStatus,
}

/// HTTP client for REST API endpoints.
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POST a JSON body and decode the JSON answer.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST request");

        let response = self.inner.post(&url).json(body).send().await?;
        decode(response).await
    }

    /// Submit an async job; `body` is the synchronous request body.
    pub async fn submit(
        &self,
        path: &str,
        mut body: Value,
        webhook_url: Option<&str>,
    ) -> Result<SubmitResponse, ClientError> {
        if let (Some(url), Some(object)) = (webhook_url, body.as_object_mut()) {
            object.insert("webhook_url".to_string(), Value::String(url.to_string()));
        }
        self.post_json(path, &body).await
    }

    /// Task status view.
    pub async fn task(&self, task_id: &str) -> Result<Value, ClientError> {
        let url = format!("{}/api/v1/tasks/{}", self.base_url, task_id);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        decode(response).await
    }

    /// Task result, or the current status while the task is still running.
    pub async fn result(&self, task_id: &str) -> Result<TaskResult, ClientError> {
        let url = format!("{}/api/v1/tasks/{}/result", self.base_url, task_id);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        match response.status().as_u16() {
            202 => {
                let not_ready: NotReady = response.json().await?;
                Ok(TaskResult::Pending(not_ready.status))
            }
            500 => Err(ClientError::TaskFailed(detail(response).await)),
            _ => decode(response).await.map(TaskResult::Ready),
        }
    }

    /// Poll the result endpoint until the task finishes or `timeout` elapses.
    pub async fn wait(
        &self,
        task_id: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.result(task_id).await? {
                TaskResult::Ready(value) => return Ok(value),
                TaskResult::Pending(status) => {
                    debug!(task_id, status = %status, "Task not finished yet");
                }
            }
            if tokio::time::Instant::now() + interval > deadline {
                return Err(ClientError::Timeout(task_id.to_string()));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(detail(response).await));
    }
    if !status.is_success() {
        return Err(ClientError::Api {
            status: status.as_u16(),
            detail: detail(response).await,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::Serialization(e.to_string()))
}

/// The `detail` field of an error body, or the raw body.
async fn detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(String::from))
        .unwrap_or(text)
}
