//! 数据仓储层接口定义
//!
//! 持久化层的核心抽象：
//! - `TaskRepository` - 任务配置与运行状态
//! - `ScheduleRepository` - 调度规则与周期调度绑定
//! - `TaskErrorRepository` - 聚合后的错误记录
//!
//! 所有实现必须 `Send + Sync`，任务行采用"读取-修改-写回"模式，不加行锁，
//! 并发执行时最后一次写入生效。错误记录的去重依赖存储层唯一约束完成原子 upsert。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ErrorOccurrence, PeriodicScheduleBinding, ScheduleKind, ScheduleRef, ScheduleSpec, Task,
    TaskError,
};
use crate::SchedulerResult;

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 根据限定名查找任务
    async fn find_by_qualified_name(&self, qualified_name: &str) -> SchedulerResult<Option<Task>>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>>;

    /// 按限定名排序返回全部任务
    async fn find_all(&self) -> SchedulerResult<Vec<Task>>;

    /// 按限定名获取或创建任务
    ///
    /// 返回任务以及是否为本次新建。并发创建同名任务时只会有一行写入成功，
    /// 其余调用读取到已存在的行。
    async fn get_or_create(&self, task: &Task) -> SchedulerResult<(Task, bool)>;

    /// 整行写回，最后一次写入生效
    async fn save(&self, task: &Task) -> SchedulerResult<Task>;

    /// 只写声明式字段（描述、通知/停用策略、重试次数、调度描述）
    ///
    /// `is_active` 与运行状态字段保持数据库中的当前值，不会被调用方的旧快照覆盖。
    async fn update_declarative(&self, task: &Task) -> SchedulerResult<Task>;
}

/// 调度规则与绑定仓储接口
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 按字段完全相等获取或创建调度规则行
    async fn get_or_create_spec(&self, spec: &ScheduleSpec) -> SchedulerResult<ScheduleRef>;

    async fn find_spec(&self, schedule: ScheduleRef) -> SchedulerResult<Option<ScheduleSpec>>;

    /// 某一类调度规则的行数
    async fn count_specs(&self, kind: ScheduleKind) -> SchedulerResult<i64>;

    async fn find_binding(&self, name: &str) -> SchedulerResult<Option<PeriodicScheduleBinding>>;

    /// 按名称获取或创建绑定
    ///
    /// 新建时 `enabled = true`；已存在时只更新任务名与调度规则引用，保留 `enabled`。
    async fn upsert_binding(
        &self,
        name: &str,
        task: &str,
        schedule: ScheduleRef,
    ) -> SchedulerResult<(PeriodicScheduleBinding, bool)>;

    /// 设置绑定的启用状态，绑定不存在时返回 `None`
    async fn set_binding_enabled(
        &self,
        name: &str,
        enabled: bool,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>>;

    /// 记录周期调度器的触发时间
    async fn record_binding_run(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>>;
}

/// 错误记录仓储接口
#[async_trait]
pub trait TaskErrorRepository: Send + Sync {
    /// 原子地记录一次错误发生
    ///
    /// 同一 `(task, error_type, function_name, file_path, line_number)` 至多存在一条未清除记录：
    /// 已存在则 `occurrence_count + 1` 并刷新 `last_seen`、`error_message`，状态置为 `ongoing`；
    /// 否则新建 `occurrence_count = 1`、状态 `new` 的记录。
    async fn upsert_occurrence(&self, occurrence: &ErrorOccurrence) -> SchedulerResult<TaskError>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskError>>;

    /// 任务的全部错误记录（含已清除），按 `last_seen` 倒序
    async fn find_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskError>>;

    /// 将任务的 `new`/`ongoing` 记录标记为 `regressed`，返回受影响行数
    async fn mark_regressed(&self, task_id: i64, at: DateTime<Utc>) -> SchedulerResult<u64>;

    /// 清除一条记录，已清除的记录保持原样
    async fn clear(&self, id: i64, actor: &str, at: DateTime<Utc>) -> SchedulerResult<TaskError>;

    /// 清除任务的全部未清除记录，返回清除数量
    async fn clear_all_for_task(
        &self,
        task_id: i64,
        actor: &str,
        at: DateTime<Utc>,
    ) -> SchedulerResult<u64>;

    async fn count_active(&self, task_id: i64) -> SchedulerResult<i64>;
}
