use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{JobError, TaskOutcome};
use crate::SchedulerResult;

/// 提交给队列引擎的任务注册选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    pub queue: String,
    pub max_retries: u32,
    pub acks_late: bool,
    pub retry_backoff: bool,
    pub track_started: bool,
}

/// 队列引擎调用的可执行单元
///
/// 返回值与错误原样交还给引擎，重试与退避由引擎自行决定。
#[async_trait]
pub trait TaskExecutable: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, args: serde_json::Value) -> Result<TaskOutcome, JobError>;
}

/// 外部分布式任务队列引擎
#[async_trait]
pub trait QueueEngine: Send + Sync {
    /// 以限定名注册可执行单元
    async fn register(
        &self,
        name: &str,
        executable: Arc<dyn TaskExecutable>,
        options: TaskOptions,
    ) -> SchedulerResult<()>;

    /// 投递一次立即执行
    async fn enqueue(&self, name: &str, args: serde_json::Value) -> SchedulerResult<()>;
}
