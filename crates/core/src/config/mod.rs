//! 配置管理
//!
//! - **models**: 应用配置 (`AppConfig`) 及各配置段
//! - **task_config**: 单个作业注册时的策略配置 (`TaskConfig`)
//!
//! 加载顺序：内置默认值 → TOML 配置文件 → 环境变量 (`TASKHUB__<SECTION>__<KEY>`)。

pub mod models;
pub mod task_config;

pub use models::{
    AppConfig, DatabaseConfig, LogFormat, LoggingConfig, NotifierConfig, NotifierKind,
    QueueConfig,
};
pub use task_config::TaskConfig;
