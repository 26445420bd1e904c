use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://taskhub.db".to_string(),
            max_connections: 5,
            connection_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.url.is_empty() {
            return Err(SchedulerError::config_error("数据库URL不能为空"));
        }

        if !self.url.starts_with("sqlite:") {
            return Err(SchedulerError::config_error("数据库URL必须是SQLite格式"));
        }

        if self.max_connections == 0 {
            return Err(SchedulerError::config_error("最大连接数必须大于0"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(SchedulerError::config_error("连接超时时间必须大于0"));
        }

        Ok(())
    }
}
