pub mod job;
pub mod schedule;
pub mod task;
pub mod task_error;

pub use job::*;
pub use schedule::*;
pub use task::*;
pub use task_error::*;
