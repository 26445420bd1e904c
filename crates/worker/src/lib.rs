//! 任务执行生命周期
//!
//! - **error_ledger**: 错误去重与聚合
//! - **escalator**: 失败告警
//! - **circuit_breaker**: 失败后停用任务及其调度
//! - **lifecycle**: 每次执行的开始/成功/失败记账
//! - **registry**: 作业注册入口

pub mod circuit_breaker;
pub mod error_ledger;
pub mod escalator;
pub mod lifecycle;
pub mod registry;

pub use circuit_breaker::CircuitBreaker;
pub use error_ledger::ErrorLedger;
pub use escalator::NotificationEscalator;
pub use lifecycle::{LifecycleManager, LifecycleTask, StartOutcome};
pub use registry::{RunNowOutcome, TaskRegistry};
