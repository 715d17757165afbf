//! In-process orchestration: submitted jobs run as tokio tasks and their
//! state lives in the task store. A crash loses in-flight work.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ranksys_core::{TaskId, TaskStatus};
use tracing::{error, info, warn};

use super::{execute_job, join_failure, BatchRunner, Job, RunnerError, Submission, TaskView};
use crate::service::RankingService;
use crate::store::TaskStore;
use crate::webhook::WebhookNotifier;

/// Runs submitted jobs in this process.
pub struct InProcessRunner {
    store: Arc<dyn TaskStore>,
    service: Arc<RankingService>,
    notifier: WebhookNotifier,
}

impl InProcessRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        service: Arc<RankingService>,
        notifier: WebhookNotifier,
    ) -> Self {
        Self {
            store,
            service,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }
}

#[async_trait]
impl BatchRunner for InProcessRunner {
    async fn submit(
        &self,
        job: Job,
        webhook_url: Option<String>,
    ) -> Result<Submission, RunnerError> {
        job.validate()?;
        let task = self
            .store
            .create_task(job.task_type(), job.request_data()?, webhook_url.clone())
            .await?;

        let submission = Submission {
            task_id: task.task_id.clone(),
            task_type: task.task_type,
            status: task.status,
            created_at: task.created_at,
        };

        tokio::spawn(run_task(
            Arc::clone(&self.store),
            Arc::clone(&self.service),
            self.notifier.clone(),
            task.task_id,
            job,
            webhook_url,
        ));

        Ok(submission)
    }

    async fn poll(&self, task_id: &TaskId) -> Result<Option<TaskView>, RunnerError> {
        Ok(self.store.get_task(task_id).await?.map(TaskView::from))
    }

    async fn status_counts(&self) -> Result<BTreeMap<TaskStatus, usize>, RunnerError> {
        Ok(self.store.count_by_status().await?)
    }

    async fn purge_expired(&self) -> Result<usize, RunnerError> {
        Ok(self.store.purge_expired().await?)
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

async fn run_task(
    store: Arc<dyn TaskStore>,
    service: Arc<RankingService>,
    notifier: WebhookNotifier,
    task_id: TaskId,
    job: Job,
    webhook_url: Option<String>,
) {
    let task_type = job.task_type();
    match store
        .update_status(&task_id, TaskStatus::Processing, None, None)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(task_id = %task_id, "Task disappeared before it started");
            return;
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Failed to mark task processing");
            return;
        }
    }

    // The job runs in its own task so a panic still lands as a failure.
    let outcome = tokio::spawn(async move { execute_job(&service, &job).await }).await;
    let (status, result, error) = match outcome {
        Ok(Ok(value)) => (TaskStatus::Completed, Some(value), None),
        Ok(Err(e)) => {
            warn!(task_id = %task_id, task_type = %task_type, error = %e, "Task failed");
            (TaskStatus::Failed, None, Some(e.to_string()))
        }
        Err(e) => {
            let message = join_failure(e);
            error!(task_id = %task_id, task_type = %task_type, error = %message, "Task aborted");
            (TaskStatus::Failed, None, Some(message))
        }
    };

    if let Err(e) = store
        .update_status(&task_id, status, result, error.clone())
        .await
    {
        error!(task_id = %task_id, error = %e, "Failed to record task outcome");
    }
    info!(task_id = %task_id, task_type = %task_type, status = %status, "Task finished");

    if let Some(url) = webhook_url {
        notifier
            .send_notification(&url, &task_id, task_type, status, error)
            .await;
    }
}
