pub mod app_config;
pub mod database;
pub mod logging;
pub mod notifier;
pub mod queue;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use notifier::{NotifierConfig, NotifierKind};
pub use queue::QueueConfig;
