use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {name}")]
    TaskNotFound { name: String },

    #[error("任务错误记录未找到: {id}")]
    TaskErrorNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found<S: Into<String>>(name: S) -> Self {
        Self::TaskNotFound { name: name.into() }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn invalid_cron<E: Into<String>, M: Into<String>>(expr: E, message: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// 配置类错误在注册阶段出现时必须中止启动
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::InvalidCron { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_)
                | SchedulerError::DatabaseOperation(_)
                | SchedulerError::MessageQueue(_)
                | SchedulerError::Notification(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SchedulerError {
    fn from(err: config::ConfigError) -> Self {
        SchedulerError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SchedulerError::config_error("bad crontab").is_fatal());
        assert!(SchedulerError::invalid_cron("* *", "too short").is_fatal());
        assert!(!SchedulerError::database_error("locked").is_fatal());
        assert!(SchedulerError::database_error("locked").is_retryable());
        assert!(!SchedulerError::task_not_found("sync_widgets").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulerError::task_not_found("sync_widgets");
        assert!(err.to_string().contains("sync_widgets"));

        let err = SchedulerError::invalid_cron("99 * * * *", "minute out of range");
        assert!(err.to_string().contains("99 * * * *"));
        assert!(err.to_string().contains("minute out of range"));
    }
}
