//! Repository error helpers that attach operation context and log once at the source.

use std::fmt;

use sqlx::Error as SqlxError;
use taskhub_core::SchedulerError;
use tracing::error;

/// Operation context for repository operations
#[derive(Debug, Clone, Copy)]
pub enum RepositoryOperation {
    Create,
    Read,
    Update,
    Upsert,
    Query,
    BatchUpdate,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Upsert => write!(f, "写入或更新"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::BatchUpdate => write!(f, "批量更新"),
        }
    }
}

/// Which record an operation touched, for error messages.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation: RepositoryOperation,
    pub entity: &'static str,
    pub key: Option<String>,
}

impl OperationContext {
    pub fn new(operation: RepositoryOperation, entity: &'static str) -> Self {
        Self {
            operation,
            entity,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn entity_description(&self) -> String {
        match &self.key {
            Some(key) => format!("{} '{}'", self.entity, key),
            None => self.entity.to_string(),
        }
    }
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 将 sqlx 错误转换为带上下文的调度器错误
    pub fn database_error(context: &OperationContext, error: SqlxError) -> SchedulerError {
        let entity_desc = context.entity_description();
        let msg = match &error {
            SqlxError::Database(db_error) if db_error.is_unique_violation() => format!(
                "{}{}时发生唯一约束冲突: {}",
                context.operation,
                entity_desc,
                db_error.message()
            ),
            SqlxError::Database(db_error) if db_error.is_foreign_key_violation() => format!(
                "{}{}时引用的记录不存在: {}",
                context.operation,
                entity_desc,
                db_error.message()
            ),
            SqlxError::PoolTimedOut => {
                format!("{}{}时获取数据库连接超时", context.operation, entity_desc)
            }
            other => format!("{}{}失败: {}", context.operation, entity_desc, other),
        };
        error!(error = %error, "{}", msg);
        SchedulerError::database_error(msg)
    }
}

#[macro_export]
macro_rules! repo_context {
    ($operation:expr, $entity:expr) => {
        $crate::error_handling::OperationContext::new($operation, $entity)
    };
    ($operation:expr, $entity:expr, $key:expr) => {
        $crate::error_handling::OperationContext::new($operation, $entity).with_key($key)
    };
}
