pub mod migrations;
pub mod sqlite;

pub use sqlite::{SqliteScheduleRepository, SqliteTaskErrorRepository, SqliteTaskRepository};

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use taskhub_core::{
    DatabaseConfig, ScheduleRepository, SchedulerResult, TaskErrorRepository, TaskRepository,
};

/// SQLite 连接池与仓储工厂
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// 按配置连接数据库并运行迁移
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let in_memory = config.url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库每个连接都是独立的库，只能保留唯一一个长期连接
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await?;

        let manager = Self { pool };
        manager.migrate().await?;
        info!("数据库已就绪: {}", config.url);
        Ok(manager)
    }

    /// 测试与单进程场景使用的内存数据库
    pub async fn in_memory() -> SchedulerResult<Self> {
        Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connection_timeout_seconds: 5,
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        debug!("运行数据库迁移");
        migrations::run_migrations(&self.pool).await
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::new(SqliteTaskRepository::new(self.pool.clone()))
    }

    pub fn schedule_repository(&self) -> Arc<dyn ScheduleRepository> {
        Arc::new(SqliteScheduleRepository::new(self.pool.clone()))
    }

    pub fn task_error_repository(&self) -> Arc<dyn TaskErrorRepository> {
        Arc::new(SqliteTaskErrorRepository::new(self.pool.clone()))
    }
}
