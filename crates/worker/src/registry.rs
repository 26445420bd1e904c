use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use taskhub_core::{
    Job, QueueConfig, QueueEngine, SchedulerError, SchedulerResult, Task, TaskConfig,
    TaskExecutable, TaskIdentity, TaskOptions,
};
use taskhub_dispatcher::ScheduleReconciler;

use crate::lifecycle::{LifecycleManager, LifecycleTask};

/// Result of an operator "run now" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunNowOutcome {
    Enqueued,
    /// The task is inactive; nothing was enqueued.
    Skipped,
}

#[derive(Clone)]
struct RegisteredTask {
    identity: TaskIdentity,
    config: TaskConfig,
    options: TaskOptions,
}

/// 任务注册表
///
/// 由进程启动代码持有：派生任务标识、在注册时对账一次调度、把作业包装成带生命周期
/// 记账的可执行单元交给队列引擎。
pub struct TaskRegistry {
    reconciler: Arc<ScheduleReconciler>,
    lifecycle: Arc<LifecycleManager>,
    engine: Arc<dyn QueueEngine>,
    queue_config: QueueConfig,
    tasks: RwLock<BTreeMap<String, RegisteredTask>>,
}

impl TaskRegistry {
    pub fn new(
        reconciler: Arc<ScheduleReconciler>,
        lifecycle: Arc<LifecycleManager>,
        engine: Arc<dyn QueueEngine>,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            reconciler,
            lifecycle,
            engine,
            queue_config,
            tasks: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn reconciler(&self) -> &Arc<ScheduleReconciler> {
        &self.reconciler
    }

    /// 注册作业
    ///
    /// 配置错误（包括重复的限定名）直接返回，调用方应中止启动。
    #[instrument(skip(self, job, config), fields(function = job.function_name()))]
    pub async fn register(
        &self,
        job: Job,
        config: TaskConfig,
    ) -> SchedulerResult<Arc<dyn TaskExecutable>> {
        config.validate()?;
        let identity = TaskIdentity::for_job(&job, config.name.as_deref());

        // 持有写锁直到插入完成，同名的并发注册只有一个能通过检查
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&identity.qualified_name) {
            return Err(SchedulerError::config_error(format!(
                "任务重复注册: {}",
                identity.qualified_name
            )));
        }

        self.reconciler.reconcile(&identity, &config).await?;

        let options = TaskOptions {
            queue: self.queue_config.route_for(&identity.app),
            max_retries: config.max_retries,
            acks_late: self.queue_config.acks_late,
            retry_backoff: self.queue_config.retry_backoff,
            track_started: self.queue_config.track_started,
        };
        let executable: Arc<dyn TaskExecutable> = Arc::new(LifecycleTask::new(
            identity.clone(),
            job,
            self.lifecycle.clone(),
        ));
        self.engine
            .register(&identity.qualified_name, executable.clone(), options.clone())
            .await?;

        info!(
            "任务已注册: {} (队列: {}, 最大重试: {})",
            identity.qualified_name, options.queue, options.max_retries
        );
        tasks.insert(
            identity.qualified_name.clone(),
            RegisteredTask {
                identity,
                config,
                options,
            },
        );
        Ok(executable)
    }

    /// 对所有已注册任务重新执行一次调度对账，进程启动时调用
    pub async fn reconcile_all_registered_tasks(&self) -> SchedulerResult<Vec<Task>> {
        let registered: Vec<RegisteredTask> = self.tasks.read().await.values().cloned().collect();

        let mut tasks = Vec::with_capacity(registered.len());
        for entry in &registered {
            tasks.push(self.reconciler.reconcile(&entry.identity, &entry.config).await?);
        }
        info!("已对账 {} 个注册任务", tasks.len());
        Ok(tasks)
    }

    /// 按限定名或短名查找任务标识
    pub async fn lookup(&self, name: &str) -> Option<TaskIdentity> {
        let tasks = self.tasks.read().await;
        if let Some(entry) = tasks.get(name) {
            return Some(entry.identity.clone());
        }
        tasks
            .values()
            .find(|entry| entry.identity.name == name)
            .map(|entry| entry.identity.clone())
    }

    pub async fn options_for(&self, name: &str) -> Option<TaskOptions> {
        let identity = self.lookup(name).await?;
        self.tasks
            .read()
            .await
            .get(&identity.qualified_name)
            .map(|entry| entry.options.clone())
    }

    pub async fn registered(&self) -> Vec<TaskIdentity> {
        self.tasks
            .read()
            .await
            .values()
            .map(|entry| entry.identity.clone())
            .collect()
    }

    /// 立即投递一次执行；停用的任务不投递
    pub async fn run_now(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> SchedulerResult<RunNowOutcome> {
        let identity = self
            .lookup(name)
            .await
            .ok_or_else(|| SchedulerError::task_not_found(name))?;
        let task = self
            .reconciler
            .task_repository()
            .find_by_qualified_name(&identity.qualified_name)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(&identity.qualified_name))?;

        if !task.is_active {
            info!("任务 {} 已停用，不执行立即运行", identity.qualified_name);
            return Ok(RunNowOutcome::Skipped);
        }

        self.engine.enqueue(&identity.qualified_name, args).await?;
        Ok(RunNowOutcome::Enqueued)
    }
}
