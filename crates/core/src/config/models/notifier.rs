use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write notifications to the log only
    #[default]
    Log,
    /// POST notifications as JSON to `webhook_url`
    Webhook,
}

/// Notification delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub webhook_url: Option<String>,
    /// Upper bound on a single delivery attempt
    pub timeout_seconds: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_seconds: 5,
        }
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.timeout_seconds == 0 {
            return Err(SchedulerError::config_error("通知超时时间必须大于0"));
        }

        if self.kind == NotifierKind::Webhook {
            match self.webhook_url.as_deref() {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => {
                    return Err(SchedulerError::config_error(format!(
                        "Webhook URL必须以http://或https://开头: {url}"
                    )))
                }
                None => {
                    return Err(SchedulerError::config_error(
                        "webhook通知方式需要配置webhook_url",
                    ))
                }
            }
        }

        Ok(())
    }
}
