use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use taskhub_core::{
    CrontabSpec, IntervalPeriod, ScheduleKind, ScheduleRepository, ScheduleSpec, SchedulerError,
    SchedulerResult, Task, TaskConfig, TaskIdentity, TaskRepository, TaskStatus,
};
use taskhub_dispatcher::ScheduleReconciler;
use taskhub_infrastructure::DatabaseManager;

async fn setup() -> (DatabaseManager, ScheduleReconciler) {
    let db = DatabaseManager::in_memory().await.unwrap();
    let reconciler = ScheduleReconciler::new(db.task_repository(), db.schedule_repository());
    (db, reconciler)
}

fn identity(name: &str) -> TaskIdentity {
    TaskIdentity::derive("shared::jobs", name, None)
}

#[tokio::test]
async fn test_same_spec_registered_twice_yields_one_row() {
    let (db, reconciler) = setup().await;
    let config = TaskConfig::new().schedule(ScheduleSpec::every(5, IntervalPeriod::Minutes));

    reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();
    reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();
    reconciler.reconcile(&identity("sync_gadgets"), &config).await.unwrap();

    let schedules = db.schedule_repository();
    assert_eq!(schedules.count_specs(ScheduleKind::Interval).await.unwrap(), 1);
    assert_eq!(db.task_repository().find_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_new_task_copies_policy_and_enables_binding() {
    let (db, reconciler) = setup().await;
    let config = TaskConfig::new()
        .description("Sync widgets from the vendor API")
        .schedule(ScheduleSpec::every(1, IntervalPeriod::Minutes))
        .disable_on_error(true)
        .max_retries(5);

    let task = reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();

    assert_eq!(task.qualified_name, "shared.tasks.sync_widgets");
    assert_eq!(task.name, "sync_widgets");
    assert!(task.is_active);
    assert!(task.disable_on_error);
    assert_eq!(task.max_retries, 5);
    assert_eq!(task.schedule, "Every 1 minutes");

    let binding = db
        .schedule_repository()
        .find_binding("shared.tasks.sync_widgets")
        .await
        .unwrap()
        .unwrap();
    assert!(binding.enabled);
    assert_eq!(binding.task, "shared.tasks.sync_widgets");
}

#[tokio::test]
async fn test_existing_task_keeps_runtime_state_and_disabled_binding() {
    let (db, reconciler) = setup().await;
    let tasks = db.task_repository();
    let config = TaskConfig::new().schedule(ScheduleSpec::every(1, IntervalPeriod::Minutes));

    let mut task = reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();
    task.is_active = false;
    task.last_status = TaskStatus::Error;
    task.last_error = "Error in task sync_widgets: boom".to_string();
    let task = tasks.save(&task).await.unwrap();
    reconciler.sync_enabled(&task).await.unwrap();

    let changed = TaskConfig::new()
        .schedule(ScheduleSpec::crontab(CrontabSpec::default().minute("0").hour("3")))
        .notify_on_error(false);
    let task = reconciler.reconcile(&identity("sync_widgets"), &changed).await.unwrap();

    assert!(!task.is_active);
    assert!(!task.notify_on_error);
    assert_eq!(task.last_status, TaskStatus::Error);
    assert!(task.last_error.contains("boom"));
    assert_eq!(task.schedule, "0 3 * * * (m/h/dM/MY/d)");

    let binding = db
        .schedule_repository()
        .find_binding("shared.tasks.sync_widgets")
        .await
        .unwrap()
        .unwrap();
    assert!(!binding.enabled);
    assert_eq!(binding.schedule.kind(), ScheduleKind::Crontab);
}

#[tokio::test]
async fn test_malformed_schedule_is_configuration_error() {
    let (db, reconciler) = setup().await;
    let config = TaskConfig::new().schedule(ScheduleSpec::crontab(
        CrontabSpec::default().minute("61"),
    ));

    let err = reconciler
        .reconcile(&identity("sync_widgets"), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration(_)));
    assert!(db.task_repository().find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_task_without_schedule_has_no_binding() {
    let (db, reconciler) = setup().await;
    let task = reconciler
        .reconcile(&identity("manual_job"), &TaskConfig::new())
        .await
        .unwrap();

    assert!(reconciler.sync_enabled(&task).await.unwrap().is_none());
    assert!(reconciler.next_run_for(&task, Utc::now()).await.unwrap().is_none());
    assert!(db
        .schedule_repository()
        .find_binding(&task.qualified_name)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_next_run_follows_fired_bookkeeping() {
    let (_db, reconciler) = setup().await;
    let config = TaskConfig::new().schedule(ScheduleSpec::every(5, IntervalPeriod::Minutes));
    let task = reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();

    let now = Utc::now();
    reconciler
        .mark_fired(&task.qualified_name, now - Duration::minutes(12))
        .await
        .unwrap()
        .unwrap();

    let next = reconciler.next_run_for(&task, now).await.unwrap().unwrap();
    assert!((next - (now + Duration::minutes(3))).num_milliseconds().abs() < 1);

    assert!(reconciler.mark_fired("unknown", now).await.unwrap().is_none());
}

/// Task store that lets a concurrent worker trip the task right after
/// `get_or_create` hands the reconciler its snapshot.
struct TripAfterReadRepository {
    inner: Arc<dyn TaskRepository>,
    schedules: Arc<dyn ScheduleRepository>,
    armed: AtomicBool,
}

#[async_trait]
impl TaskRepository for TripAfterReadRepository {
    async fn find_by_qualified_name(&self, qualified_name: &str) -> SchedulerResult<Option<Task>> {
        self.inner.find_by_qualified_name(qualified_name).await
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Task>> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> SchedulerResult<Vec<Task>> {
        self.inner.find_all().await
    }

    async fn get_or_create(&self, task: &Task) -> SchedulerResult<(Task, bool)> {
        let (snapshot, created) = self.inner.get_or_create(task).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            let mut tripped = snapshot.clone();
            tripped.is_active = false;
            tripped.last_status = TaskStatus::Error;
            tripped.last_error = "Error in task sync_widgets: boom".to_string();
            tripped.last_run = Some(Utc::now());
            self.inner.save(&tripped).await?;
            self.schedules
                .set_binding_enabled(&tripped.qualified_name, false)
                .await?;
        }
        Ok((snapshot, created))
    }

    async fn save(&self, task: &Task) -> SchedulerResult<Task> {
        self.inner.save(task).await
    }

    async fn update_declarative(&self, task: &Task) -> SchedulerResult<Task> {
        self.inner.update_declarative(task).await
    }
}

#[tokio::test]
async fn test_reconcile_does_not_undo_concurrent_trip() {
    let db = DatabaseManager::in_memory().await.unwrap();
    let tasks = Arc::new(TripAfterReadRepository {
        inner: db.task_repository(),
        schedules: db.schedule_repository(),
        armed: AtomicBool::new(false),
    });
    let reconciler = ScheduleReconciler::new(tasks.clone(), db.schedule_repository());
    let config = TaskConfig::new().schedule(ScheduleSpec::every(1, IntervalPeriod::Minutes));

    reconciler.reconcile(&identity("sync_widgets"), &config).await.unwrap();

    tasks.armed.store(true, Ordering::SeqCst);
    let task = reconciler
        .reconcile(&identity("sync_widgets"), &config.clone().notify_on_error(false))
        .await
        .unwrap();

    assert!(!task.is_active);
    assert!(!task.notify_on_error);
    assert_eq!(task.last_status, TaskStatus::Error);
    assert!(task.last_error.contains("boom"));
    assert!(task.last_run.is_some());

    let binding = db
        .schedule_repository()
        .find_binding("shared.tasks.sync_widgets")
        .await
        .unwrap()
        .unwrap();
    assert!(!binding.enabled);
}
