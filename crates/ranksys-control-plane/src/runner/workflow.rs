//! Workflow orchestration.
//!
//! Each submitted job becomes a workflow execution with id `<type>-<uuid>`.
//! The workflow body only sequences activities and does pure computation;
//! every side effect (page fetch, scenario generation, ranking, webhook)
//! runs as an activity on a bounded worker pool with its own timeout and
//! the shared retry policy. Task status is read from the execution
//! registry, not from the task store.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use ranksys_core::{
    Backoff, BatchResult, Candidate, RetryPolicy, Scenario, ScenarioResult, SessionId, TaskId,
    TaskStatus, TaskType,
};
use ranksys_oracle::fallback_scenarios;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use super::{join_failure, to_value, BatchRunner, Job, RunnerError, Submission, TaskView};
use crate::enrichment::{apply_fetched, url_candidate, FetchedContent};
use crate::progress::{ProgressFrame, ProgressSink};
use crate::service::{GenerateScenariosRequest, RankingService, ScenarioList, ServiceError};
use crate::webhook::WebhookNotifier;

/// Retry policy shared by every activity: 3 attempts, 2s doubling to 30s.
pub const DEFAULT_ACTIVITY_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: Backoff::Exponential {
        initial: Duration::from_secs(2),
        max: Duration::from_secs(30),
    },
};

/// Per-activity timeouts and retry policy.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub fetch_timeout: Duration,
    pub generate_timeout: Duration,
    pub rank_timeout: Duration,
    pub webhook_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(120),
            generate_timeout: Duration::from_secs(120),
            rank_timeout: Duration::from_secs(90),
            webhook_timeout: Duration::from_secs(30),
            retry: DEFAULT_ACTIVITY_RETRY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    fn task_status(self) -> TaskStatus {
        match self {
            Self::Queued => TaskStatus::Pending,
            Self::Running => TaskStatus::Processing,
            Self::Completed => TaskStatus::Completed,
            Self::Failed => TaskStatus::Failed,
        }
    }
}

struct Execution {
    task_type: TaskType,
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    result: Option<Value>,
    error: Option<String>,
}

impl Execution {
    fn view(&self, workflow_id: &TaskId) -> TaskView {
        TaskView {
            task_id: workflow_id.clone(),
            task_type: self.task_type,
            status: self.status.task_status(),
            created_at: self.started_at,
            completed_at: self.closed_at,
            result: self
                .result
                .clone()
                .filter(|_| self.status == ExecutionStatus::Completed),
            error: self
                .error
                .clone()
                .filter(|_| self.status == ExecutionStatus::Failed),
        }
    }
}

struct Inner {
    service: Arc<RankingService>,
    notifier: WebhookNotifier,
    options: ActivityOptions,
    workers: Semaphore,
    executions: RwLock<HashMap<TaskId, Execution>>,
    retention: chrono::Duration,
}

/// Runs submitted jobs as workflow executions over an activity worker pool.
pub struct WorkflowRunner {
    inner: Arc<Inner>,
}

impl WorkflowRunner {
    /// `workers` bounds concurrently running activities; closed executions
    /// are kept for `retention`.
    pub fn new(
        service: Arc<RankingService>,
        notifier: WebhookNotifier,
        workers: usize,
        retention: Duration,
        options: ActivityOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                notifier,
                options,
                workers: Semaphore::new(workers.max(1)),
                executions: RwLock::new(HashMap::new()),
                retention: chrono::Duration::from_std(retention)
                    .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            }),
        }
    }
}

#[async_trait]
impl BatchRunner for WorkflowRunner {
    async fn submit(
        &self,
        job: Job,
        webhook_url: Option<String>,
    ) -> Result<Submission, RunnerError> {
        job.validate()?;
        let task_type = job.task_type();
        let workflow_id = TaskId::generate_prefixed(task_type.workflow_prefix());
        let started_at = Utc::now();

        self.inner.executions.write().await.insert(
            workflow_id.clone(),
            Execution {
                task_type,
                status: ExecutionStatus::Queued,
                started_at,
                closed_at: None,
                result: None,
                error: None,
            },
        );
        info!(workflow_id = %workflow_id, task_type = %task_type, "Workflow started");

        let inner = Arc::clone(&self.inner);
        let id = workflow_id.clone();
        tokio::spawn(async move {
            let body = tokio::spawn({
                let inner = Arc::clone(&inner);
                let id = id.clone();
                async move { inner.execute(id, job, webhook_url).await }
            });
            if let Err(e) = body.await {
                let message = join_failure(e);
                error!(workflow_id = %id, error = %message, "Workflow aborted");
                inner
                    .record(&id, ExecutionStatus::Failed, None, Some(message))
                    .await;
            }
        });

        Ok(Submission {
            task_id: workflow_id,
            task_type,
            status: TaskStatus::Pending,
            created_at: started_at,
        })
    }

    async fn poll(&self, task_id: &TaskId) -> Result<Option<TaskView>, RunnerError> {
        let executions = self.inner.executions.read().await;
        Ok(executions.get(task_id).map(|e| e.view(task_id)))
    }

    async fn status_counts(&self) -> Result<BTreeMap<TaskStatus, usize>, RunnerError> {
        let mut counts: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for execution in self.inner.executions.read().await.values() {
            *counts.entry(execution.status.task_status()).or_default() += 1;
        }
        Ok(counts)
    }

    async fn purge_expired(&self) -> Result<usize, RunnerError> {
        let now = Utc::now();
        let retention = self.inner.retention;
        let mut executions = self.inner.executions.write().await;
        let before = executions.len();
        executions.retain(|_, e| match e.closed_at {
            Some(closed) => closed + retention > now,
            None => true,
        });
        Ok(before - executions.len())
    }

    fn name(&self) -> &'static str {
        "workflow"
    }
}

fn activity_error(e: ServiceError) -> RunnerError {
    match e {
        ServiceError::InvalidInput(msg) => RunnerError::InvalidInput(msg),
        other => RunnerError::Activity(other.to_string()),
    }
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value, RunnerError> {
    to_value(value).map_err(|e| RunnerError::Activity(e.to_string()))
}

impl Inner {
    async fn execute(&self, id: TaskId, job: Job, webhook_url: Option<String>) {
        self.record(&id, ExecutionStatus::Running, None, None).await;

        let (status, result, error) = match self.run_workflow(&id, &job).await {
            Ok(value) => (ExecutionStatus::Completed, Some(value), None),
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "Workflow failed");
                (ExecutionStatus::Failed, None, Some(e.to_string()))
            }
        };
        self.record(&id, status, result, error.clone()).await;
        info!(workflow_id = %id, status = %status.task_status(), "Workflow closed");

        if let Some(url) = webhook_url {
            let notifier = &self.notifier;
            let url = url.as_str();
            let workflow_id = &id;
            let error = &error;
            let task_type = job.task_type();
            let task_status = status.task_status();
            let sent = self
                .activity(
                    &id,
                    "send_webhook_notification",
                    self.options.webhook_timeout,
                    move || async move {
                        Ok(notifier
                            .send_notification(url, workflow_id, task_type, task_status, error.clone())
                            .await)
                    },
                )
                .await;
            if let Err(e) = sent {
                warn!(workflow_id = %id, error = %e, "Webhook activity failed");
            }
        }
    }

    async fn record(
        &self,
        id: &TaskId,
        status: ExecutionStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let mut executions = self.executions.write().await;
        if let Some(execution) = executions.get_mut(id) {
            if execution.closed_at.is_some() {
                return;
            }
            execution.status = status;
            if matches!(status, ExecutionStatus::Completed | ExecutionStatus::Failed) {
                execution.closed_at = Some(Utc::now());
                execution.result = result;
                execution.error = error;
            }
        }
    }

    /// Run one activity on the worker pool with timeout and retry.
    async fn activity<T, F, Fut>(
        &self,
        workflow_id: &TaskId,
        name: &'static str,
        timeout: Duration,
        mut op: F,
    ) -> Result<T, RunnerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RunnerError>>,
    {
        self.options
            .retry
            .run(
                name,
                move |attempt| {
                    let work = op();
                    async move {
                        let _slot = self
                            .workers
                            .acquire()
                            .await
                            .map_err(|_| RunnerError::Activity("activity pool closed".into()))?;
                        debug!(
                            workflow_id = %workflow_id,
                            activity = name,
                            attempt = attempt,
                            "Running activity"
                        );
                        match tokio::time::timeout(timeout, work).await {
                            Ok(result) => result,
                            Err(_) => Err(RunnerError::Activity(format!(
                                "{} timed out after {}s",
                                name,
                                timeout.as_secs_f64()
                            ))),
                        }
                    }
                },
                |e| matches!(e, RunnerError::Activity(_)),
            )
            .await
    }

    async fn run_workflow(&self, id: &TaskId, job: &Job) -> Result<Value, RunnerError> {
        let service = &self.service;
        match job {
            Job::Rank(request) => {
                let decision = self
                    .activity(id, "rank_candidates", self.options.rank_timeout, move || async move {
                        service.rank(request).await.map_err(activity_error)
                    })
                    .await?;
                encode(decision)
            }
            Job::RankUrls(request) => {
                request.validate().map_err(activity_error)?;
                let candidates = self.fetch_url_candidates(id, &request.urls).await;
                let candidates = candidates.as_slice();
                let task = request.task_description.as_str();
                let decision = self
                    .activity(id, "rank_candidates", self.options.rank_timeout, move || async move {
                        service
                            .rank_url_candidates(task, candidates)
                            .await
                            .map_err(activity_error)
                    })
                    .await?;
                encode(decision)
            }
            Job::BatchGenerate(request) => encode(self.generate(id, request).await?),
            Job::BatchTest(request) => {
                let candidates = self.enrich(id, &request.candidates).await;
                let result = self
                    .evaluate(id, &candidates, &request.scenarios, request.session_id.as_ref())
                    .await;
                encode(result)
            }
            Job::BatchRun(request) => {
                let candidates = self.enrich(id, &request.candidates).await;
                let generated = self
                    .generate(
                        id,
                        &GenerateScenariosRequest {
                            candidates: candidates.clone(),
                            num_scenarios: request.num_scenarios,
                            custom_query: request.custom_query.clone(),
                        },
                    )
                    .await?;
                let result = self
                    .evaluate(
                        id,
                        &candidates,
                        &generated.scenarios,
                        request.session_id.as_ref(),
                    )
                    .await;
                encode(result)
            }
        }
    }

    async fn fetch(&self, id: &TaskId, url: &str) -> FetchedContent {
        let fetcher = self.service.fetcher();
        self.activity(id, "fetch_url_content", self.options.fetch_timeout, move || async move {
            Ok(fetcher.fetch(url).await)
        })
        .await
        .unwrap_or_else(|e| FetchedContent::failed(url, e.to_string()))
    }

    async fn enrich(&self, id: &TaskId, candidates: &[Candidate]) -> Vec<Candidate> {
        let units = candidates.iter().map(|candidate| async move {
            let mut candidate = candidate.clone();
            if candidate.needs_enrichment() {
                if let Some(url) = candidate.url().map(str::to_string) {
                    let fetched = self.fetch(id, &url).await;
                    apply_fetched(&mut candidate, &fetched);
                }
            }
            candidate
        });
        join_all(units).await
    }

    async fn fetch_url_candidates(&self, id: &TaskId, urls: &[String]) -> Vec<Candidate> {
        let units = urls.iter().enumerate().map(|(idx, url)| async move {
            let fetched = self.fetch(id, url).await;
            url_candidate(idx, url, &fetched)
        });
        join_all(units).await
    }

    async fn generate(
        &self,
        id: &TaskId,
        request: &GenerateScenariosRequest,
    ) -> Result<ScenarioList, RunnerError> {
        let service = &self.service;
        let outcome = self
            .activity(id, "generate_scenarios", self.options.generate_timeout, move || async move {
                service
                    .generate_scenarios(request)
                    .await
                    .map_err(activity_error)
            })
            .await;

        match outcome {
            Ok(list) => Ok(list),
            Err(RunnerError::InvalidInput(msg)) => Err(RunnerError::InvalidInput(msg)),
            Err(e) => {
                warn!(workflow_id = %id, error = %e, "Scenario generation activity failed, using fallback scenarios");
                Ok(ScenarioList {
                    scenarios: fallback_scenarios(request.num_scenarios),
                })
            }
        }
    }

    /// Fan out one `rank_single_scenario` activity per scenario, fan in,
    /// then aggregate.
    async fn evaluate(
        &self,
        id: &TaskId,
        candidates: &[Candidate],
        scenarios: &[Scenario],
        session_id: Option<&SessionId>,
    ) -> BatchResult {
        let service = &self.service;
        let sink = session_id.map(|s| service.progress().sink(s.clone()));
        let sink = sink.as_ref();
        let total = scenarios.len();
        let completed = Mutex::new(0usize);
        let completed = &completed;

        let units = scenarios.iter().map(|scenario| async move {
            let outcome = self
                .activity(id, "rank_single_scenario", self.options.rank_timeout, move || async move {
                    Ok(service.evaluate_scenario(candidates, scenario).await)
                })
                .await;
            let detail = outcome.unwrap_or_else(|e| ScenarioResult::failed(scenario, e));

            let mut done = completed.lock().await;
            *done += 1;
            if let Some(sink) = sink {
                sink.report(ProgressFrame::new(*done, total));
            }
            detail
        });
        let details = join_all(units).await;

        if let Some(session_id) = session_id {
            service.progress().close(session_id);
        }
        BatchResult::aggregate(candidates, details)
    }
}
