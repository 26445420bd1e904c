use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use taskhub_core::{
    ErrorOccurrence, ErrorStatus, SchedulerError, SchedulerResult, TaskError, TaskErrorRepository,
};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
use crate::repo_context;

const ERROR_COLUMNS: &str = "id, task_id, error_type, error_message, function_name, file_path, \
    line_number, occurrence_count, first_seen, last_seen, status, regressed_at, cleared, \
    cleared_at, cleared_by";

pub struct SqliteTaskErrorRepository {
    pool: SqlitePool,
}

impl SqliteTaskErrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task_error(row: &SqliteRow) -> SchedulerResult<TaskError> {
        let status: String = row.try_get("status")?;
        let line_number: i64 = row.try_get("line_number")?;

        Ok(TaskError {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            error_type: row.try_get("error_type")?,
            error_message: row.try_get("error_message")?,
            function_name: row.try_get("function_name")?,
            file_path: row.try_get("file_path")?,
            line_number: u32::try_from(line_number).unwrap_or_default(),
            occurrence_count: row.try_get("occurrence_count")?,
            first_seen: row.try_get("first_seen")?,
            last_seen: row.try_get("last_seen")?,
            status: status.parse::<ErrorStatus>()?,
            regressed_at: row.try_get("regressed_at")?,
            cleared: row.try_get("cleared")?,
            cleared_at: row.try_get("cleared_at")?,
            cleared_by: row.try_get("cleared_by")?,
        })
    }
}

#[async_trait]
impl TaskErrorRepository for SqliteTaskErrorRepository {
    #[instrument(skip(self, occurrence), fields(
        task_id = occurrence.task_id,
        error_type = %occurrence.error_type,
        function = %occurrence.trace.function_name,
    ))]
    async fn upsert_occurrence(&self, occurrence: &ErrorOccurrence) -> SchedulerResult<TaskError> {
        let context = repo_context!(
            RepositoryOperation::Upsert,
            "错误记录",
            format!("{}@{}", occurrence.error_type, occurrence.task_id)
        );

        // 冲突目标带上部分索引的 WHERE 条件，已清除的记录不参与去重
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO task_errors (task_id, error_type, error_message, function_name, file_path,
                line_number, occurrence_count, first_seen, last_seen, status, cleared)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, 'new', 0)
            ON CONFLICT (task_id, error_type, function_name, file_path, line_number)
                WHERE cleared = 0
            DO UPDATE SET
                occurrence_count = task_errors.occurrence_count + 1,
                last_seen = excluded.last_seen,
                error_message = excluded.error_message,
                status = 'ongoing',
                regressed_at = NULL
            RETURNING {ERROR_COLUMNS}
            "#
        ))
        .bind(occurrence.task_id)
        .bind(&occurrence.error_type)
        .bind(&occurrence.error_message)
        .bind(&occurrence.trace.function_name)
        .bind(&occurrence.trace.file_path)
        .bind(i64::from(occurrence.trace.line_number))
        .bind(occurrence.seen_at)
        .bind(occurrence.seen_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let record = Self::row_to_task_error(&row)?;
        debug!(
            "错误记录 {} 累计 {} 次 (状态: {})",
            record.id, record.occurrence_count, record.status
        );
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskError>> {
        let context = repo_context!(RepositoryOperation::Read, "错误记录", id);
        let row = sqlx::query(&format!("SELECT {ERROR_COLUMNS} FROM task_errors WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_task_error).transpose()
    }

    async fn find_by_task(&self, task_id: i64) -> SchedulerResult<Vec<TaskError>> {
        let context = repo_context!(RepositoryOperation::Query, "错误记录", task_id);
        let rows = sqlx::query(&format!(
            "SELECT {ERROR_COLUMNS} FROM task_errors WHERE task_id = ? ORDER BY last_seen DESC, id DESC"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        rows.iter().map(Self::row_to_task_error).collect()
    }

    #[instrument(skip(self))]
    async fn mark_regressed(&self, task_id: i64, at: DateTime<Utc>) -> SchedulerResult<u64> {
        let context = repo_context!(RepositoryOperation::BatchUpdate, "错误记录", task_id);
        let result = sqlx::query(
            "UPDATE task_errors SET status = 'regressed', regressed_at = ? \
             WHERE task_id = ? AND cleared = 0 AND status IN ('new', 'ongoing')",
        )
        .bind(at)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn clear(&self, id: i64, actor: &str, at: DateTime<Utc>) -> SchedulerResult<TaskError> {
        let context = repo_context!(RepositoryOperation::Update, "错误记录", id);
        sqlx::query(
            "UPDATE task_errors SET cleared = 1, cleared_at = ?, cleared_by = ?, status = 'cleared' \
             WHERE id = ? AND cleared = 0",
        )
        .bind(at)
        .bind(actor)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        self.find_by_id(id)
            .await?
            .ok_or(SchedulerError::TaskErrorNotFound { id })
    }

    #[instrument(skip(self))]
    async fn clear_all_for_task(
        &self,
        task_id: i64,
        actor: &str,
        at: DateTime<Utc>,
    ) -> SchedulerResult<u64> {
        let context = repo_context!(RepositoryOperation::BatchUpdate, "错误记录", task_id);
        let result = sqlx::query(
            "UPDATE task_errors SET cleared = 1, cleared_at = ?, cleared_by = ?, status = 'cleared' \
             WHERE task_id = ? AND cleared = 0",
        )
        .bind(at)
        .bind(actor)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok(result.rows_affected())
    }

    async fn count_active(&self, task_id: i64) -> SchedulerResult<i64> {
        let context = repo_context!(RepositoryOperation::Query, "错误记录", task_id);
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM task_errors WHERE task_id = ? AND cleared = 0")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use taskhub_core::{ErrorTrace, Task, TaskRepository};

    async fn setup() -> (DatabaseManager, SqliteTaskErrorRepository, i64) {
        let db = DatabaseManager::in_memory().await.unwrap();
        let (task, _) = db
            .task_repository()
            .get_or_create(&Task::new("sync_widgets", "shared.tasks.sync_widgets"))
            .await
            .unwrap();
        let repo = SqliteTaskErrorRepository::new(db.pool().clone());
        (db, repo, task.id)
    }

    fn occurrence(task_id: i64, message: &str, line_number: u32) -> ErrorOccurrence {
        ErrorOccurrence {
            task_id,
            error_type: "ValueError".to_string(),
            error_message: message.to_string(),
            trace: ErrorTrace {
                function_name: "sync_widgets".to_string(),
                file_path: "src/jobs.rs".to_string(),
                line_number,
            },
            seen_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_repeat_occurrence_increments_count() {
        let (_db, repo, task_id) = setup().await;

        let first = repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        assert_eq!(first.occurrence_count, 1);
        assert_eq!(first.status, ErrorStatus::New);

        let second = repo.upsert_occurrence(&occurrence(task_id, "boom again", 10)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(second.status, ErrorStatus::Ongoing);
        assert_eq!(second.error_message, "boom again");
        assert_eq!(second.first_seen, first.first_seen);

        let other_line = repo.upsert_occurrence(&occurrence(task_id, "boom", 11)).await.unwrap();
        assert_ne!(other_line.id, first.id);
        assert_eq!(repo.count_active(task_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cleared_key_opens_new_record() {
        let (_db, repo, task_id) = setup().await;

        let first = repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        let cleared = repo.clear(first.id, "ops", Utc::now()).await.unwrap();
        assert!(cleared.cleared);
        assert_eq!(cleared.status, ErrorStatus::Cleared);
        assert_eq!(cleared.cleared_by.as_deref(), Some("ops"));

        let reopened = repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        assert_ne!(reopened.id, first.id);
        assert_eq!(reopened.occurrence_count, 1);
        assert_eq!(repo.find_by_task(task_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (_db, repo, task_id) = setup().await;

        let record = repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        let first = repo.clear(record.id, "alice", Utc::now()).await.unwrap();
        let second = repo.clear(record.id, "bob", Utc::now()).await.unwrap();

        assert_eq!(second.cleared_by.as_deref(), Some("alice"));
        assert_eq!(second.cleared_at, first.cleared_at);
        assert!(matches!(
            repo.clear(9999, "alice", Utc::now()).await,
            Err(SchedulerError::TaskErrorNotFound { id: 9999 })
        ));
    }

    #[tokio::test]
    async fn test_mark_regressed_keeps_counts() {
        let (_db, repo, task_id) = setup().await;

        repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();

        assert_eq!(repo.mark_regressed(task_id, Utc::now()).await.unwrap(), 1);
        assert_eq!(repo.mark_regressed(task_id, Utc::now()).await.unwrap(), 0);

        let records = repo.find_by_task(task_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ErrorStatus::Regressed);
        assert_eq!(records[0].occurrence_count, 2);
        assert!(records[0].regressed_at.is_some());
        assert!(!records[0].cleared);
    }

    #[tokio::test]
    async fn test_clear_all_for_task() {
        let (_db, repo, task_id) = setup().await;

        repo.upsert_occurrence(&occurrence(task_id, "boom", 10)).await.unwrap();
        repo.upsert_occurrence(&occurrence(task_id, "boom", 20)).await.unwrap();

        assert_eq!(repo.clear_all_for_task(task_id, "ops", Utc::now()).await.unwrap(), 2);
        assert_eq!(repo.count_active(task_id).await.unwrap(), 0);
        assert_eq!(repo.clear_all_for_task(task_id, "ops", Utc::now()).await.unwrap(), 0);
    }
}
