//! Execution bookkeeping around each job invocation.
//!
//! Every boundary refetches the task row, mutates it in memory and writes it back whole.
//! Concurrent invocations of the same task are not locked against each other; the last
//! write wins. Bookkeeping failures are logged and dropped so that the job's own result
//! or error always reaches the queue engine unchanged.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use taskhub_core::{
    Job, JobContext, JobError, JobResult, SchedulerResult, Task, TaskExecutable, TaskIdentity,
    TaskOutcome, TaskRepository, TaskStatus,
};

use crate::circuit_breaker::CircuitBreaker;
use crate::error_ledger::ErrorLedger;
use crate::escalator::NotificationEscalator;

/// What `on_start` decided about an invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// The task was marked running.
    Started(Task),
    /// The task is inactive; the job must not run.
    Skipped,
    /// The task row could not be read or written; the job still runs.
    Untracked,
}

pub struct LifecycleManager {
    task_repo: Arc<dyn TaskRepository>,
    ledger: Arc<ErrorLedger>,
    escalator: Arc<NotificationEscalator>,
    breaker: Arc<CircuitBreaker>,
}

impl LifecycleManager {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        ledger: Arc<ErrorLedger>,
        escalator: Arc<NotificationEscalator>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            task_repo,
            ledger,
            escalator,
            breaker,
        }
    }

    pub fn ledger(&self) -> &Arc<ErrorLedger> {
        &self.ledger
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn fetch(&self, qualified_name: &str) -> SchedulerResult<Option<Task>> {
        self.task_repo.find_by_qualified_name(qualified_name).await
    }

    #[instrument(skip(self))]
    pub async fn on_start(&self, qualified_name: &str) -> StartOutcome {
        let mut task = match self.fetch(qualified_name).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!("任务记录不存在，跳过状态跟踪: {}", qualified_name);
                return StartOutcome::Untracked;
            }
            Err(e) => {
                error!("读取任务 {} 失败，跳过状态跟踪: {}", qualified_name, e);
                return StartOutcome::Untracked;
            }
        };

        if !task.is_active {
            info!("任务 {} 已停用，跳过执行", qualified_name);
            return StartOutcome::Skipped;
        }

        task.last_run = Some(Utc::now());
        task.last_status = TaskStatus::Running;
        task.last_result = String::new();

        match self.task_repo.save(&task).await {
            Ok(task) => StartOutcome::Started(task),
            Err(e) => {
                error!("更新任务 {} 运行状态失败: {}", qualified_name, e);
                StartOutcome::Untracked
            }
        }
    }

    #[instrument(skip(self, result))]
    pub async fn on_success(&self, qualified_name: &str, result: &JobResult) {
        let mut task = match self.fetch(qualified_name).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!("任务记录不存在，无法记录成功结果: {}", qualified_name);
                return;
            }
            Err(e) => {
                error!("读取任务 {} 失败，无法记录成功结果: {}", qualified_name, e);
                return;
            }
        };

        task.last_status = TaskStatus::Success;
        task.last_result = result.message.clone();
        task.last_error = String::new();
        task.last_run = Some(Utc::now());

        let task = match self.task_repo.save(&task).await {
            Ok(task) => task,
            Err(e) => {
                error!("保存任务 {} 成功状态失败: {}", qualified_name, e);
                return;
            }
        };

        if let Err(e) = self.ledger.reconcile_on_success(&task).await {
            error!("标记任务 {} 的错误记录为 regressed 失败: {}", qualified_name, e);
        }
    }

    #[instrument(skip(self, job_error), fields(kind = %job_error.kind()))]
    pub async fn on_error(&self, qualified_name: &str, job_error: &JobError) {
        let mut task = match self.fetch(qualified_name).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!("任务记录不存在，无法记录错误: {}: {}", qualified_name, job_error);
                return;
            }
            Err(e) => {
                error!("读取任务 {} 失败，无法记录错误 ({}): {}", qualified_name, job_error, e);
                return;
            }
        };

        task.last_status = TaskStatus::Error;
        task.last_error = job_error.for_task(&task.name);

        if let Err(e) = self.ledger.record(&task, job_error).await {
            error!("记录任务 {} 的错误失败: {}", qualified_name, e);
        }

        if task.disable_on_error {
            if let Err(e) = self.breaker.trip(&mut task).await {
                error!("停用任务 {} 失败: {}", qualified_name, e);
            }
        }

        if task.notify_on_error {
            self.escalator.send(&task, job_error).await;
        }

        if let Err(e) = self.task_repo.save(&task).await {
            error!("保存任务 {} 错误状态失败: {}", qualified_name, e);
        }
    }

    /// Bracket one invocation of `job`. The job's result or error is returned unchanged.
    pub async fn execute(
        &self,
        identity: &TaskIdentity,
        job: &Job,
        args: serde_json::Value,
    ) -> Result<TaskOutcome, JobError> {
        let qualified_name = identity.qualified_name.as_str();
        if self.on_start(qualified_name).await == StartOutcome::Skipped {
            metrics::counter!("taskhub_task_runs_total", "task" => qualified_name.to_string(), "outcome" => "skipped")
                .increment(1);
            return Ok(TaskOutcome::Skipped);
        }

        let ctx = JobContext {
            task_name: identity.name.clone(),
            qualified_name: identity.qualified_name.clone(),
            args,
        };
        let started = Instant::now();
        let result = job.call(ctx).await;
        metrics::histogram!("taskhub_task_duration_seconds", "task" => qualified_name.to_string())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(result) => {
                debug!("任务 {} 执行成功: {}", qualified_name, result.message);
                self.on_success(qualified_name, &result).await;
                metrics::counter!("taskhub_task_runs_total", "task" => qualified_name.to_string(), "outcome" => "success")
                    .increment(1);
                Ok(TaskOutcome::Completed(result))
            }
            Err(job_error) => {
                let job_error = if job_error.trace().function_name.is_empty() {
                    job_error.in_function(job.function_name())
                } else {
                    job_error
                };
                warn!("任务 {} 执行失败: {}", qualified_name, job_error);
                self.on_error(qualified_name, &job_error).await;
                metrics::counter!("taskhub_task_runs_total", "task" => qualified_name.to_string(), "outcome" => "error")
                    .increment(1);
                Err(job_error)
            }
        }
    }
}

/// The executable handed to the queue engine for one registered job.
pub struct LifecycleTask {
    identity: TaskIdentity,
    job: Job,
    lifecycle: Arc<LifecycleManager>,
}

impl LifecycleTask {
    pub fn new(identity: TaskIdentity, job: Job, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            identity,
            job,
            lifecycle,
        }
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }
}

#[async_trait]
impl TaskExecutable for LifecycleTask {
    fn name(&self) -> &str {
        &self.identity.qualified_name
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<TaskOutcome, JobError> {
        self.lifecycle.execute(&self.identity, &self.job, args).await
    }
}
