use std::sync::Arc;

use chrono::Utc;
use taskhub_core::{
    DatabaseConfig, ErrorOccurrence, ErrorTrace, IntervalPeriod, ScheduleKind, ScheduleSpec, Task,
};
use taskhub_infrastructure::DatabaseManager;

async fn file_database(dir: &tempfile::TempDir) -> DatabaseManager {
    let path = dir.path().join("taskhub.db");
    DatabaseManager::new(&DatabaseConfig {
        url: format!("sqlite://{}", path.display()),
        max_connections: 4,
        connection_timeout_seconds: 5,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_migrations_are_repeatable_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_database(&dir).await;

    db.migrate().await.unwrap();
    db.health_check().await.unwrap();

    let (task, created) = db
        .task_repository()
        .get_or_create(&Task::new("heartbeat", "taskhub.tasks.heartbeat"))
        .await
        .unwrap();
    assert!(created);
    db.close().await;

    let reopened = file_database(&dir).await;
    let stored = reopened
        .task_repository()
        .find_by_qualified_name("taskhub.tasks.heartbeat")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, task.id);
}

#[tokio::test]
async fn test_concurrent_failures_collapse_into_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_database(&dir).await;

    let (task, _) = db
        .task_repository()
        .get_or_create(&Task::new("sync_widgets", "shared.tasks.sync_widgets"))
        .await
        .unwrap();
    let errors = db.task_error_repository();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let errors = Arc::clone(&errors);
        let task_id = task.id;
        handles.push(tokio::spawn(async move {
            errors
                .upsert_occurrence(&ErrorOccurrence {
                    task_id,
                    error_type: "ValueError".to_string(),
                    error_message: "boom".to_string(),
                    trace: ErrorTrace {
                        function_name: "sync_widgets".to_string(),
                        file_path: "src/jobs.rs".to_string(),
                        line_number: 42,
                    },
                    seen_at: Utc::now(),
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = errors.find_by_task(task.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].occurrence_count, 8);
}

#[tokio::test]
async fn test_specs_shared_across_tasks() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let schedules = db.schedule_repository();
    let spec = ScheduleSpec::every(5, IntervalPeriod::Minutes);

    let a = schedules.get_or_create_spec(&spec).await.unwrap();
    schedules
        .upsert_binding("shared.tasks.a", "shared.tasks.a", a)
        .await
        .unwrap();
    let b = schedules.get_or_create_spec(&spec).await.unwrap();
    schedules
        .upsert_binding("shared.tasks.b", "shared.tasks.b", b)
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(schedules.count_specs(ScheduleKind::Interval).await.unwrap(), 1);
}
