use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::{SchedulerError, SchedulerResult};

/// 初始化全局日志订阅器
///
/// `RUST_LOG` 存在时优先于配置中的级别。重复初始化返回配置错误，
/// 调用方可以选择忽略（例如测试中多次初始化）。
pub fn init_logging(config: &LoggingConfig) -> SchedulerResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| SchedulerError::config_error(format!("初始化JSON日志格式失败: {e}"))),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| SchedulerError::config_error(format!("初始化Pretty日志格式失败: {e}"))),
    }
}
