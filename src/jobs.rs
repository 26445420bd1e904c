//! 内置作业

use std::sync::Arc;

use taskhub_core::{
    IntervalPeriod, Job, JobContext, JobError, JobResult, ScheduleSpec, SchedulerResult, TaskConfig,
    TaskRepository,
};
use taskhub_worker::TaskRegistry;

/// Reports how many registered tasks are currently active.
pub fn heartbeat(task_repo: Arc<dyn TaskRepository>) -> Job {
    Job::new(module_path!(), "heartbeat", move |_ctx: JobContext| {
        let task_repo = Arc::clone(&task_repo);
        async move {
            let tasks = task_repo.find_all().await?;
            let active = tasks.iter().filter(|task| task.is_active).count() as i64;
            Ok::<_, JobError>(JobResult::counted(format!("{active} active tasks"), active))
        }
    })
}

pub fn heartbeat_config() -> TaskConfig {
    TaskConfig::new()
        .description("Report the number of active tasks")
        .schedule(ScheduleSpec::every(5, IntervalPeriod::Minutes))
}

/// Register every built-in job with `registry`.
pub async fn register_builtin_jobs(
    registry: &TaskRegistry,
    task_repo: Arc<dyn TaskRepository>,
) -> SchedulerResult<()> {
    registry
        .register(heartbeat(task_repo), heartbeat_config())
        .await?;
    Ok(())
}
