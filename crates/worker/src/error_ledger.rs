use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};

use taskhub_core::{
    ErrorOccurrence, JobError, SchedulerResult, Task, TaskError, TaskErrorRepository,
};

/// Error ledger
///
/// Aggregates failures per `(task, error_type, function_name, file_path, line_number)`.
/// Deduplication relies on the repository's atomic upsert, so concurrent failures of the
/// same fault never produce duplicate open records. Records are never deleted; success
/// annotates them as regressed and operators clear them.
pub struct ErrorLedger {
    repo: Arc<dyn TaskErrorRepository>,
}

impl ErrorLedger {
    pub fn new(repo: Arc<dyn TaskErrorRepository>) -> Self {
        Self { repo }
    }

    /// Record one failure occurrence.
    #[instrument(skip(self, task, error), fields(task = %task.qualified_name, kind = %error.kind()))]
    pub async fn record(&self, task: &Task, error: &JobError) -> SchedulerResult<TaskError> {
        let occurrence = ErrorOccurrence {
            task_id: task.id,
            error_type: error.kind().to_string(),
            error_message: error.message().to_string(),
            trace: error.trace().clone(),
            seen_at: Utc::now(),
        };

        let record = self.repo.upsert_occurrence(&occurrence).await?;
        metrics::counter!("taskhub_task_errors_recorded_total", "task" => task.qualified_name.clone())
            .increment(1);
        debug!("错误已记录: {}", record);
        Ok(record)
    }

    /// Mark every open `new`/`ongoing` record of the task as regressed.
    pub async fn reconcile_on_success(&self, task: &Task) -> SchedulerResult<u64> {
        let regressed = self.repo.mark_regressed(task.id, Utc::now()).await?;
        if regressed > 0 {
            info!("任务 {} 执行成功，{} 条错误记录标记为 regressed", task.name, regressed);
        }
        Ok(regressed)
    }

    /// Operator action. Clearing an already cleared record leaves it unchanged.
    pub async fn clear(&self, error_id: i64, actor: &str) -> SchedulerResult<TaskError> {
        let record = self.repo.clear(error_id, actor, Utc::now()).await?;
        info!("错误记录 {} 已被 {} 清除", record.id, actor);
        Ok(record)
    }

    pub async fn clear_all_for_task(&self, task: &Task, actor: &str) -> SchedulerResult<u64> {
        let cleared = self.repo.clear_all_for_task(task.id, actor, Utc::now()).await?;
        info!("任务 {} 的 {} 条错误记录已被 {} 清除", task.name, cleared, actor);
        Ok(cleared)
    }

    pub async fn active_error_count(&self, task: &Task) -> SchedulerResult<i64> {
        self.repo.count_active(task.id).await
    }

    /// "3 active" or "none".
    pub async fn error_count_display(&self, task: &Task) -> SchedulerResult<String> {
        let count = self.active_error_count(task).await?;
        Ok(if count > 0 {
            format!("{count} active")
        } else {
            "none".to_string()
        })
    }

    pub async fn errors_for(&self, task: &Task) -> SchedulerResult<Vec<TaskError>> {
        self.repo.find_by_task(task.id).await
    }
}
