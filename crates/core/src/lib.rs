pub mod config;
pub mod display;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::{
    AppConfig, DatabaseConfig, LogFormat, LoggingConfig, NotifierConfig, NotifierKind,
    QueueConfig, TaskConfig,
};
pub use errors::*;
pub use models::*;
pub use traits::*;
