use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use taskhub_core::{
    JobError, QueueEngine, SchedulerError, SchedulerResult, TaskExecutable, TaskOptions,
    TaskOutcome,
};

/// 排队中的一次调用
#[derive(Debug, Clone)]
pub struct QueuedInvocation {
    pub task: String,
    pub args: serde_json::Value,
}

struct Registration {
    executable: Arc<dyn TaskExecutable>,
    options: TaskOptions,
}

struct QueueChannels {
    sender: mpsc::UnboundedSender<QueuedInvocation>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueuedInvocation>>>,
}

impl QueueChannels {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }
}

/// 内存队列引擎
///
/// 单进程场景下的队列引擎：按注册时的队列名路由，调用失败时按 `max_retries` 重试，
/// `retry_backoff` 开启时每次重试的等待时间翻倍。
pub struct InMemoryQueueEngine {
    registrations: RwLock<HashMap<String, Registration>>,
    queues: RwLock<HashMap<String, QueueChannels>>,
    backoff_base: Duration,
}

impl InMemoryQueueEngine {
    pub fn new() -> Self {
        Self::with_backoff_base(Duration::from_secs(1))
    }

    /// 指定首次重试前的等待时间
    pub fn with_backoff_base(backoff_base: Duration) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            backoff_base,
        }
    }

    pub async fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registrations.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn options_for(&self, name: &str) -> Option<TaskOptions> {
        self.registrations
            .read()
            .await
            .get(name)
            .map(|registration| registration.options.clone())
    }

    /// 直接执行一次（含重试），不经过队列
    pub async fn invoke_now(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> SchedulerResult<Result<TaskOutcome, JobError>> {
        let (executable, options) = {
            let registrations = self.registrations.read().await;
            let registration = registrations
                .get(name)
                .ok_or_else(|| SchedulerError::task_not_found(name))?;
            (registration.executable.clone(), registration.options.clone())
        };
        Ok(self.run_with_retries(executable, &options, args).await)
    }

    /// 执行队列中所有待处理的调用，返回每次调用的最终结果
    pub async fn drain(&self, queue: &str) -> Vec<(String, Result<TaskOutcome, JobError>)> {
        let receiver = match self.queues.read().await.get(queue) {
            Some(channels) => channels.receiver.clone(),
            None => return Vec::new(),
        };

        let mut results = Vec::new();
        loop {
            let next = receiver.lock().await.try_recv();
            let Ok(invocation) = next else {
                break;
            };
            match self.invoke_now(&invocation.task, invocation.args).await {
                Ok(outcome) => results.push((invocation.task, outcome)),
                Err(e) => warn!("丢弃无法执行的消息 {}: {}", invocation.task, e),
            }
        }
        results
    }

    async fn run_with_retries(
        &self,
        executable: Arc<dyn TaskExecutable>,
        options: &TaskOptions,
        args: serde_json::Value,
    ) -> Result<TaskOutcome, JobError> {
        let mut attempt: u32 = 0;
        loop {
            match executable.invoke(args.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if attempt < options.max_retries => {
                    let delay = if options.retry_backoff {
                        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
                    } else {
                        self.backoff_base
                    };
                    attempt += 1;
                    warn!(
                        "任务 {} 执行失败，第 {}/{} 次重试 ({:?} 后): {}",
                        executable.name(),
                        attempt,
                        options.max_retries,
                        delay,
                        error
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for InMemoryQueueEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueEngine for InMemoryQueueEngine {
    async fn register(
        &self,
        name: &str,
        executable: Arc<dyn TaskExecutable>,
        options: TaskOptions,
    ) -> SchedulerResult<()> {
        self.queues
            .write()
            .await
            .entry(options.queue.clone())
            .or_insert_with(QueueChannels::new);

        info!("注册任务 {} 到队列 {}", name, options.queue);
        self.registrations.write().await.insert(
            name.to_string(),
            Registration {
                executable,
                options,
            },
        );
        Ok(())
    }

    async fn enqueue(&self, name: &str, args: serde_json::Value) -> SchedulerResult<()> {
        let queue = self
            .registrations
            .read()
            .await
            .get(name)
            .map(|registration| registration.options.queue.clone())
            .ok_or_else(|| SchedulerError::task_not_found(name))?;

        let queues = self.queues.read().await;
        let channels = queues
            .get(&queue)
            .ok_or_else(|| SchedulerError::MessageQueue(format!("队列不存在: {queue}")))?;
        channels
            .sender
            .send(QueuedInvocation {
                task: name.to_string(),
                args,
            })
            .map_err(|e| SchedulerError::MessageQueue(format!("投递消息失败: {e}")))?;

        debug!("任务 {} 已投递到队列 {}", name, queue);
        Ok(())
    }
}
