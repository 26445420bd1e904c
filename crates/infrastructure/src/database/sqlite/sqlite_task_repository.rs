use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use taskhub_core::{SchedulerError, SchedulerResult, Task, TaskRepository, TaskStatus};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
use crate::repo_context;

const TASK_COLUMNS: &str = "id, name, qualified_name, description, is_active, notify_on_error, \
    disable_on_error, max_retries, schedule, last_run, last_status, last_result, last_error, \
    created_at, updated_at";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let last_status: String = row.try_get("last_status")?;

        Ok(Task {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            qualified_name: row.try_get("qualified_name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            notify_on_error: row.try_get("notify_on_error")?,
            disable_on_error: row.try_get("disable_on_error")?,
            max_retries: row.try_get("max_retries")?,
            schedule: row.try_get("schedule")?,
            last_run: row.try_get("last_run")?,
            last_status: last_status.parse::<TaskStatus>()?,
            last_result: row.try_get("last_result")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self))]
    async fn find_by_qualified_name(&self, qualified_name: &str) -> SchedulerResult<Option<Task>> {
        let context = repo_context!(RepositoryOperation::Read, "任务", qualified_name);
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE qualified_name = ?"
        ))
        .bind(qualified_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        let context = repo_context!(RepositoryOperation::Read, "任务", id);
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_all(&self) -> SchedulerResult<Vec<Task>> {
        let context = repo_context!(RepositoryOperation::Query, "任务");
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY qualified_name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, task), fields(task = %task.qualified_name))]
    async fn get_or_create(&self, task: &Task) -> SchedulerResult<(Task, bool)> {
        let context = repo_context!(RepositoryOperation::Create, "任务", &task.qualified_name);
        let now = Utc::now();

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (name, qualified_name, description, is_active, notify_on_error,
                disable_on_error, max_retries, schedule, last_run, last_status, last_result,
                last_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (qualified_name) DO NOTHING
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.name)
        .bind(&task.qualified_name)
        .bind(&task.description)
        .bind(task.is_active)
        .bind(task.notify_on_error)
        .bind(task.disable_on_error)
        .bind(task.max_retries)
        .bind(&task.schedule)
        .bind(task.last_run)
        .bind(task.last_status.as_str())
        .bind(&task.last_result)
        .bind(&task.last_error)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if let Some(row) = inserted {
            debug!("创建任务行: {}", task.qualified_name);
            return Ok((Self::row_to_task(&row)?, true));
        }

        let existing = self
            .find_by_qualified_name(&task.qualified_name)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(&task.qualified_name))?;
        Ok((existing, false))
    }

    #[instrument(skip(self, task), fields(task = %task.qualified_name, status = %task.last_status))]
    async fn save(&self, task: &Task) -> SchedulerResult<Task> {
        let context = repo_context!(RepositoryOperation::Update, "任务", &task.qualified_name);

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET name = ?, description = ?, is_active = ?, notify_on_error = ?,
                disable_on_error = ?, max_retries = ?, schedule = ?, last_run = ?,
                last_status = ?, last_result = ?, last_error = ?, updated_at = ?
            WHERE id = ?
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.is_active)
        .bind(task.notify_on_error)
        .bind(task.disable_on_error)
        .bind(task.max_retries)
        .bind(&task.schedule)
        .bind(task.last_run)
        .bind(task.last_status.as_str())
        .bind(&task.last_result)
        .bind(&task.last_error)
        .bind(Utc::now())
        .bind(task.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(SchedulerError::task_not_found(&task.qualified_name)),
        }
    }

    #[instrument(skip(self, task), fields(task = %task.qualified_name))]
    async fn update_declarative(&self, task: &Task) -> SchedulerResult<Task> {
        let context = repo_context!(RepositoryOperation::Update, "任务", &task.qualified_name);

        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET description = ?, notify_on_error = ?, disable_on_error = ?, max_retries = ?,
                schedule = ?, updated_at = ?
            WHERE qualified_name = ?
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.description)
        .bind(task.notify_on_error)
        .bind(task.disable_on_error)
        .bind(task.max_retries)
        .bind(&task.schedule)
        .bind(Utc::now())
        .bind(&task.qualified_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => Err(SchedulerError::task_not_found(&task.qualified_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let task = Task::new("sync_widgets", "shared.tasks.sync_widgets");
        let (first, created) = repo.get_or_create(&task).await.unwrap();
        assert!(created);
        assert!(first.id > 0);

        let (second, created) = repo.get_or_create(&task).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites_runtime_state() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let (mut task, _) = repo
            .get_or_create(&Task::new("sync_widgets", "shared.tasks.sync_widgets"))
            .await
            .unwrap();
        task.last_status = TaskStatus::Error;
        task.last_error = "Error in task sync_widgets: boom".to_string();
        task.last_run = Some(Utc::now());
        repo.save(&task).await.unwrap();

        let stored = repo
            .find_by_qualified_name("shared.tasks.sync_widgets")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_status, TaskStatus::Error);
        assert!(stored.last_error.contains("boom"));
        assert!(stored.last_run.is_some());
    }

    #[tokio::test]
    async fn test_update_declarative_leaves_runtime_state() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let (snapshot, _) = repo
            .get_or_create(&Task::new("sync_widgets", "shared.tasks.sync_widgets"))
            .await
            .unwrap();

        let mut tripped = snapshot.clone();
        tripped.is_active = false;
        tripped.last_status = TaskStatus::Error;
        tripped.last_error = "Error in task sync_widgets: boom".to_string();
        tripped.last_run = Some(Utc::now());
        repo.save(&tripped).await.unwrap();

        let mut declared = snapshot;
        declared.description = "Sync widgets".to_string();
        declared.notify_on_error = false;
        declared.max_retries = 9;
        let stored = repo.update_declarative(&declared).await.unwrap();

        assert_eq!(stored.description, "Sync widgets");
        assert!(!stored.notify_on_error);
        assert_eq!(stored.max_retries, 9);
        assert!(!stored.is_active);
        assert_eq!(stored.last_status, TaskStatus::Error);
        assert!(stored.last_error.contains("boom"));
        assert!(stored.last_run.is_some());
    }

    #[tokio::test]
    async fn test_save_unknown_task_fails() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteTaskRepository::new(db.pool().clone());

        let mut task = Task::new("ghost", "shared.tasks.ghost");
        task.id = 42;
        let result = repo.save(&task).await;
        assert!(matches!(result, Err(SchedulerError::TaskNotFound { .. })));
    }
}
