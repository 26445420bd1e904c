pub mod database;
pub mod error_handling;
pub mod in_memory_queue;
pub mod notifier;

pub use database::*;
pub use in_memory_queue::{InMemoryQueueEngine, QueuedInvocation};
pub use notifier::{build_notifier, LogNotifier, WebhookNotifier};
