use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use taskhub_core::{JobError, Notification, Notifier, NotifyPriority, Task};

/// Sends one high-priority alert per failing invocation.
///
/// Delivery is attempted once and bounded by `timeout`. Failures are logged and never
/// surface to the caller.
pub struct NotificationEscalator {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationEscalator {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    pub fn build_notification(task: &Task, error: &JobError) -> Notification {
        Notification::new(
            format!("Task Error: {}", task.name),
            error.for_task(&task.name),
            NotifyPriority::High,
        )
    }

    /// Returns whether the notifier accepted the alert.
    pub async fn send(&self, task: &Task, error: &JobError) -> bool {
        let notification = Self::build_notification(task, error);

        match tokio::time::timeout(self.timeout, self.notifier.notify(&notification)).await {
            Ok(Ok(())) => {
                metrics::counter!("taskhub_notifications_sent_total", "channel" => self.notifier.name().to_string())
                    .increment(1);
                debug!("已发送任务 {} 的错误通知", task.name);
                true
            }
            Ok(Err(e)) => {
                metrics::counter!("taskhub_notifications_failed_total", "channel" => self.notifier.name().to_string())
                    .increment(1);
                error!("发送任务 {} 的错误通知失败 ({}): {}", task.name, self.notifier.name(), e);
                false
            }
            Err(_) => {
                metrics::counter!("taskhub_notifications_failed_total", "channel" => self.notifier.name().to_string())
                    .increment(1);
                warn!(
                    "发送任务 {} 的错误通知超时 ({:?}, {})",
                    task.name,
                    self.timeout,
                    self.notifier.name()
                );
                false
            }
        }
    }
}
