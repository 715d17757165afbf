//! Webhook notifier.
//!
//! Delivery is best-effort: a bounded number of attempts with exponential
//! backoff, after which the failure is logged and dropped. The outcome never
//! feeds back into the task record.

use std::time::Duration;

use chrono::Utc;
use ranksys_core::{RetryPolicy, TaskId, TaskStatus, TaskType};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

/// Value of the `X-Webhook-Source` header.
pub const WEBHOOK_SOURCE: &str = "ranksys";

/// Why one delivery attempt failed.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook transport error: {0}")]
    Transport(String),

    #[error("Webhook request timed out")]
    Timeout,

    #[error("Webhook receiver returned HTTP {0}")]
    Status(u16),
}

impl From<reqwest::Error> for WebhookError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WebhookError::Timeout
        } else {
            WebhookError::Transport(e.to_string())
        }
    }
}

/// JSON body POSTed to the webhook URL.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub task_id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// RFC 3339 send time.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends task completion notifications.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    /// Create a notifier with the given per-attempt timeout and attempt count.
    ///
    /// Attempts are spaced 1s, 2s, 4s, ... apart.
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            retry: RetryPolicy::exponential(
                max_attempts,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Deliver a notification. Returns true once any attempt got a 2xx.
    pub async fn send_notification(
        &self,
        url: &str,
        task_id: &TaskId,
        task_type: TaskType,
        status: TaskStatus,
        error: Option<String>,
    ) -> bool {
        let payload = WebhookPayload {
            task_id: task_id.clone(),
            task_type,
            status,
            timestamp: Utc::now().to_rfc3339(),
            error,
        };

        let payload = &payload;
        let outcome = self
            .retry
            .run(
                "webhook",
                move |attempt| {
                    debug!(task_id = %task_id, url = %url, attempt = attempt, "Sending webhook");
                    self.attempt(url, payload)
                },
                |_| true,
            )
            .await;

        match outcome {
            Ok(code) => {
                info!(task_id = %task_id, url = %url, status_code = code, "Webhook delivered");
                true
            }
            Err(e) => {
                error!(
                    task_id = %task_id,
                    url = %url,
                    attempts = self.retry.max_attempts,
                    error = %e,
                    "Webhook delivery failed"
                );
                false
            }
        }
    }

    async fn attempt(&self, url: &str, payload: &WebhookPayload) -> Result<u16, WebhookError> {
        let response = self
            .client
            .post(url)
            .header("X-Webhook-Source", WEBHOOK_SOURCE)
            .header("X-Task-Id", payload.task_id.as_str())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(WebhookError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier() -> WebhookNotifier {
        WebhookNotifier::new(Duration::from_secs(2), 3)
            .with_retry(RetryPolicy::exponential(3, Duration::ZERO, Duration::ZERO))
    }

    #[tokio::test]
    async fn test_delivers_with_headers_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Webhook-Source", "ranksys"))
            .and(header("X-Task-Id", "t-1"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({
                "task_id": "t-1",
                "task_type": "batch_run",
                "status": "completed"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let ok = notifier()
            .send_notification(
                &format!("{}/hook", server.uri()),
                &TaskId::new("t-1"),
                TaskType::BatchRun,
                TaskStatus::Completed,
                None,
            )
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let ok = notifier()
            .send_notification(
                &server.uri(),
                &TaskId::new("t-2"),
                TaskType::Rank,
                TaskStatus::Failed,
                Some("boom".into()),
            )
            .await;
        assert!(!ok);
    }

    #[test]
    fn test_default_backoff_doubles_from_one_second() {
        let retry = WebhookNotifier::new(Duration::from_secs(10), 3).retry;
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_after(1), Duration::from_secs(1));
        assert_eq!(retry.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_default_schedule_waits_between_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let ok = WebhookNotifier::new(Duration::from_secs(2), 3)
            .send_notification(
                &server.uri(),
                &TaskId::new("t-4"),
                TaskType::BatchRun,
                TaskStatus::Completed,
                None,
            )
            .await;

        assert!(!ok);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_recovers_after_one_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ok = notifier()
            .send_notification(
                &server.uri(),
                &TaskId::new("t-3"),
                TaskType::Rank,
                TaskStatus::Completed,
                None,
            )
            .await;
        assert!(ok);
    }

    #[test]
    fn test_error_omitted_when_absent() {
        let payload = WebhookPayload {
            task_id: TaskId::new("t"),
            task_type: TaskType::Rank,
            status: TaskStatus::Completed,
            timestamp: "2024-01-01T00:00:00Z".into(),
            error: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("error").is_none());
    }
}
