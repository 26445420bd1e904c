pub mod notifier;
pub mod queue;
pub mod repository;

pub use notifier::*;
pub use queue::*;
pub use repository::*;
