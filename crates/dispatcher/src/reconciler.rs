use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use taskhub_core::{
    PeriodicScheduleBinding, ScheduleRepository, SchedulerResult, Task, TaskConfig, TaskIdentity,
    TaskRepository,
};

use crate::next_run::next_run;
use crate::validation::validate_schedule;

/// 调度对账器
///
/// 把声明式的调度配置幂等地落到持久化存储中：调度规则按字段去重共享，
/// 绑定按任务限定名唯一，任务行只更新声明式字段。
///
/// `enabled` 与 `is_active` 的一致性只经由 [`ScheduleReconciler::sync_enabled`] 维护，
/// 调用方在一次状态变更的最外层调用它一次。
pub struct ScheduleReconciler {
    task_repo: Arc<dyn TaskRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
}

impl ScheduleReconciler {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
    ) -> Self {
        Self {
            task_repo,
            schedule_repo,
        }
    }

    pub fn task_repository(&self) -> &Arc<dyn TaskRepository> {
        &self.task_repo
    }

    /// 对账一个任务的调度与声明式配置
    ///
    /// 配置不合法时返回 `Configuration` 错误，调用方必须中止启动。
    #[instrument(skip(self, config), fields(task = %identity.qualified_name))]
    pub async fn reconcile(
        &self,
        identity: &TaskIdentity,
        config: &TaskConfig,
    ) -> SchedulerResult<Task> {
        config.validate()?;
        if let Some(spec) = &config.schedule {
            validate_schedule(spec)?;
        }

        if let Some(spec) = &config.schedule {
            let schedule = self.schedule_repo.get_or_create_spec(spec).await?;
            let (binding, created) = self
                .schedule_repo
                .upsert_binding(&identity.qualified_name, &identity.qualified_name, schedule)
                .await?;
            debug!(
                "调度绑定已对账: {} -> {:?} (新建: {}, 启用: {})",
                binding.name, binding.schedule, created, binding.enabled
            );
        }

        let (mut task, created) = self
            .task_repo
            .get_or_create(&Task::from_config(identity, config))
            .await?;
        if created {
            info!("注册新任务: {}", task.qualified_name);
        } else {
            task.apply_declarative(config);
            task = self.task_repo.update_declarative(&task).await?;
            debug!("更新任务声明式配置: {}", task.qualified_name);
        }

        self.sync_enabled(&task).await?;
        Ok(task)
    }

    /// 使绑定的 `enabled` 与任务的 `is_active` 一致
    ///
    /// 没有绑定的任务（未配置调度）直接返回 `None`。
    #[instrument(skip(self, task), fields(task = %task.qualified_name))]
    pub async fn sync_enabled(
        &self,
        task: &Task,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>> {
        let Some(binding) = self.schedule_repo.find_binding(&task.qualified_name).await? else {
            return Ok(None);
        };

        if binding.enabled == task.is_active {
            return Ok(Some(binding));
        }

        info!(
            "同步调度绑定启用状态: {} {} -> {}",
            binding.name, binding.enabled, task.is_active
        );
        self.schedule_repo
            .set_binding_enabled(&binding.name, task.is_active)
            .await
    }

    /// 记录周期调度器的一次触发
    pub async fn mark_fired(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>> {
        let binding = self.schedule_repo.record_binding_run(name, at).await?;
        if binding.is_none() {
            warn!("未找到调度绑定，忽略触发记录: {}", name);
        }
        Ok(binding)
    }

    /// 推算任务的下一次执行时间
    pub async fn next_run_for(
        &self,
        task: &Task,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<DateTime<Utc>>> {
        let Some(binding) = self.schedule_repo.find_binding(&task.qualified_name).await? else {
            return Ok(None);
        };
        let Some(spec) = self.schedule_repo.find_spec(binding.schedule).await? else {
            warn!("调度绑定引用的规则不存在: {:?}", binding.schedule);
            return Ok(None);
        };
        Ok(next_run(&spec, Some(&binding), now))
    }
}
