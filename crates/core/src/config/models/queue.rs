use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// Options handed to the queue engine for every registered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub default_queue: String,
    /// Apps whose tasks are routed to a dedicated `<app>_queue`
    pub app_queues: Vec<String>,
    pub acks_late: bool,
    pub retry_backoff: bool,
    pub track_started: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            app_queues: Vec::new(),
            acks_late: true,
            retry_backoff: true,
            track_started: true,
        }
    }
}

impl QueueConfig {
    /// Queue a task of `app` is routed to.
    pub fn route_for(&self, app: &str) -> String {
        if self.app_queues.iter().any(|configured| configured == app) {
            format!("{app}_queue")
        } else {
            self.default_queue.clone()
        }
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.default_queue.trim().is_empty() {
            return Err(SchedulerError::config_error("默认队列名称不能为空"));
        }
        Ok(())
    }
}
