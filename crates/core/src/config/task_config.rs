use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};
use crate::models::ScheduleSpec;

/// 作业注册配置
///
/// 未指定 `name` 时由声明模块与函数名推导任务标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: Option<String>,
    pub schedule: Option<ScheduleSpec>,
    pub description: Option<String>,
    pub notify_on_error: bool,
    pub disable_on_error: bool,
    pub max_retries: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: None,
            schedule: None,
            description: None,
            notify_on_error: true,
            disable_on_error: false,
            max_retries: 3,
        }
    }
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn schedule(mut self, schedule: ScheduleSpec) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn notify_on_error(mut self, notify: bool) -> Self {
        self.notify_on_error = notify;
        self
    }

    pub fn disable_on_error(mut self, disable: bool) -> Self {
        self.disable_on_error = disable;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Structural checks; schedule field ranges are validated by the reconciler.
    pub fn validate(&self) -> SchedulerResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(SchedulerError::config_error("任务名称不能为空"));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(SchedulerError::config_error(format!(
                    "任务名称不能包含空白字符: {name:?}"
                )));
            }
        }
        if self.max_retries > i32::MAX as u32 {
            return Err(SchedulerError::config_error("max_retries 超出范围"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaskConfig::default();
        assert!(config.notify_on_error);
        assert!(!config.disable_on_error);
        assert_eq!(config.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_blank_names() {
        assert!(TaskConfig::new().name("  ").validate().is_err());
        assert!(TaskConfig::new().name("sync widgets").validate().is_err());
        assert!(TaskConfig::new().name("sync_widgets").validate().is_ok());
    }
}
