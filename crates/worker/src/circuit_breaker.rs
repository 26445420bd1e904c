use std::sync::Arc;

use tracing::{info, warn};

use taskhub_core::{SchedulerError, SchedulerResult, Task, TaskRepository};
use taskhub_dispatcher::ScheduleReconciler;

/// Task circuit breaker
///
/// Deactivates a task after a qualifying failure and keeps its schedule binding in step
/// through [`ScheduleReconciler::sync_enabled`], called exactly once per state change.
pub struct CircuitBreaker {
    task_repo: Arc<dyn TaskRepository>,
    reconciler: Arc<ScheduleReconciler>,
}

impl CircuitBreaker {
    pub fn new(task_repo: Arc<dyn TaskRepository>, reconciler: Arc<ScheduleReconciler>) -> Self {
        Self {
            task_repo,
            reconciler,
        }
    }

    /// Open the circuit: persist `is_active = false`, then disable the binding.
    ///
    /// When the write fails the binding is left alone and the in-memory task keeps its
    /// previous `is_active`.
    pub async fn trip(&self, task: &mut Task) -> SchedulerResult<()> {
        let mut opened = task.clone();
        opened.is_active = false;
        *task = self.task_repo.save(&opened).await?;
        self.reconciler.sync_enabled(task).await?;
        metrics::counter!("taskhub_circuit_trips_total", "task" => task.qualified_name.clone())
            .increment(1);
        warn!("任务 {} 因执行失败已被停用", task.qualified_name);
        Ok(())
    }

    /// Operator reset: reactivate the task and re-enable its binding.
    pub async fn reset(&self, qualified_name: &str) -> SchedulerResult<Task> {
        let mut task = self
            .task_repo
            .find_by_qualified_name(qualified_name)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(qualified_name))?;

        task.is_active = true;
        let task = self.task_repo.save(&task).await?;
        self.reconciler.sync_enabled(&task).await?;
        info!("任务 {} 已重新启用", task.qualified_name);
        Ok(task)
    }
}
