use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use taskhub_core::display::format_next_run;
use taskhub_core::{AppConfig, Task};
use taskhub_dispatcher::ScheduleReconciler;
use taskhub_infrastructure::{build_notifier, DatabaseManager, InMemoryQueueEngine};
use taskhub_worker::{
    CircuitBreaker, ErrorLedger, LifecycleManager, NotificationEscalator, RunNowOutcome,
    TaskRegistry,
};

use crate::jobs::register_builtin_jobs;

/// One line of the task listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub name: String,
    pub qualified_name: String,
    pub active: bool,
    pub last_status: String,
    pub last_run: String,
    pub next_run: String,
    pub errors: String,
}

/// 主应用程序
///
/// 持有数据库、调度对账器、生命周期管理器和任务注册表，所有组件在这里显式装配。
pub struct Application {
    config: AppConfig,
    db: DatabaseManager,
    reconciler: Arc<ScheduleReconciler>,
    lifecycle: Arc<LifecycleManager>,
    engine: Arc<InMemoryQueueEngine>,
    registry: Arc<TaskRegistry>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let db = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;

        let task_repo = db.task_repository();
        let reconciler = Arc::new(ScheduleReconciler::new(
            task_repo.clone(),
            db.schedule_repository(),
        ));

        let notifier = build_notifier(&config.notifier).context("创建通知器失败")?;
        let escalator = Arc::new(NotificationEscalator::new(
            notifier,
            Duration::from_secs(config.notifier.timeout_seconds),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            task_repo.clone(),
            Arc::new(ErrorLedger::new(db.task_error_repository())),
            escalator,
            Arc::new(CircuitBreaker::new(task_repo.clone(), reconciler.clone())),
        ));

        let engine = Arc::new(InMemoryQueueEngine::new());
        let registry = Arc::new(TaskRegistry::new(
            reconciler.clone(),
            lifecycle.clone(),
            engine.clone(),
            config.queue.clone(),
        ));
        register_builtin_jobs(&registry, task_repo)
            .await
            .context("注册内置作业失败")?;

        info!("应用程序初始化完成，已注册 {} 个任务", registry.registered().await.len());
        Ok(Self {
            config,
            db,
            reconciler,
            lifecycle,
            engine,
            registry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Startup reconciliation of every registered task.
    pub async fn reconcile(&self) -> Result<Vec<Task>> {
        self.registry
            .reconcile_all_registered_tasks()
            .await
            .context("调度对账失败")
    }

    pub async fn list(&self, now: DateTime<Utc>) -> Result<Vec<TaskRow>> {
        let tasks = self
            .db
            .task_repository()
            .find_all()
            .await
            .context("读取任务列表失败")?;

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let next_run = self.reconciler.next_run_for(&task, now).await?;
            let errors = self.lifecycle.ledger().error_count_display(&task).await?;
            rows.push(TaskRow {
                name: task.name.clone(),
                qualified_name: task.qualified_name.clone(),
                active: task.is_active,
                last_status: task.last_status.to_string(),
                last_run: task.last_run_display(now),
                next_run: format_next_run(next_run, now),
                errors,
            });
        }
        Ok(rows)
    }

    /// Enqueue `name` and drain its queue in-process.
    pub async fn run(&self, name: &str, args: serde_json::Value) -> Result<RunNowOutcome> {
        let outcome = self.registry.run_now(name, args).await?;
        if outcome == RunNowOutcome::Enqueued {
            if let Some(options) = self.registry.options_for(name).await {
                for (task, result) in self.engine.drain(&options.queue).await {
                    match result {
                        Ok(outcome) => info!("任务 {} 执行完成: {:?}", task, outcome),
                        Err(e) => info!("任务 {} 执行失败: {}", task, e),
                    }
                }
            }
        }
        Ok(outcome)
    }

    pub async fn reset(&self, name: &str) -> Result<Task> {
        let qualified_name = self.resolve(name).await;
        self.lifecycle
            .breaker()
            .reset(&qualified_name)
            .await
            .with_context(|| format!("重新启用任务失败: {name}"))
    }

    pub async fn clear_errors(&self, name: &str, actor: &str) -> Result<u64> {
        let qualified_name = self.resolve(name).await;
        let task = self
            .db
            .task_repository()
            .find_by_qualified_name(&qualified_name)
            .await?
            .with_context(|| format!("任务不存在: {name}"))?;
        Ok(self
            .lifecycle
            .ledger()
            .clear_all_for_task(&task, actor)
            .await?)
    }

    pub async fn shutdown(&self) {
        self.db.close().await;
        info!("数据库连接已关闭");
    }

    async fn resolve(&self, name: &str) -> String {
        match self.registry.lookup(name).await {
            Some(identity) => identity.qualified_name,
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_core::TaskStatus;

    async fn application(dir: &tempfile::TempDir) -> Application {
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("taskhub.db").display());
        Application::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_builtin_heartbeat_is_registered() {
        let dir = tempfile::tempdir().unwrap();
        let app = application(&dir).await;

        let tasks = app.reconcile().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].qualified_name, "taskhub.tasks.heartbeat");
        assert_eq!(tasks[0].schedule, "Every 5 minutes");

        let now = Utc::now();
        let rows = app.list(now).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "heartbeat");
        assert!(rows[0].active);
        assert_eq!(rows[0].last_run, "never");
        assert_eq!(rows[0].next_run, "in 5m");
        assert_eq!(rows[0].errors, "none");
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_run_heartbeat_counts_active_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let app = application(&dir).await;

        let outcome = app.run("heartbeat", serde_json::Value::Null).await.unwrap();
        assert_eq!(outcome, RunNowOutcome::Enqueued);

        let task = app
            .db
            .task_repository()
            .find_by_qualified_name("taskhub.tasks.heartbeat")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.last_status, TaskStatus::Success);
        assert_eq!(task.last_result, "1 active tasks");
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_and_clear_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let app = application(&dir).await;

        assert!(app.reset("nope").await.is_err());
        assert!(app.clear_errors("nope", "ops").await.is_err());
        assert_eq!(app.clear_errors("heartbeat", "ops").await.unwrap(), 0);
        assert!(app.reset("heartbeat").await.unwrap().is_active);
        app.shutdown().await;
    }
}
