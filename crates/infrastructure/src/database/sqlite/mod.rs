pub mod sqlite_schedule_repository;
pub mod sqlite_task_error_repository;
pub mod sqlite_task_repository;

pub use sqlite_schedule_repository::SqliteScheduleRepository;
pub use sqlite_task_error_repository::SqliteTaskErrorRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
