//! 调度对账
//!
//! 负责把声明式调度配置对账到持久化存储，以及推算下一次执行时间。

pub mod cron_utils;
pub mod next_run;
pub mod reconciler;
pub mod validation;

pub use cron_utils::{crontab_to_cron_expression, CronScheduler};
pub use next_run::{next_interval_run, next_run};
pub use reconciler::ScheduleReconciler;
pub use validation::validate_schedule;
