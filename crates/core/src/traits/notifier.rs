use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::SchedulerResult;

/// Notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl NotifyPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyPriority::Low => "low",
            NotifyPriority::Medium => "medium",
            NotifyPriority::High => "high",
        }
    }
}

impl fmt::Display for NotifyPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub priority: NotifyPriority,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>, priority: NotifyPriority) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            priority,
        }
    }
}

/// Outbound alert channel.
///
/// Implementations deliver once and report failure through the result; callers decide whether a
/// failure matters.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()>;

    fn name(&self) -> &str;
}
