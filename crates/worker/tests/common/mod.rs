#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use taskhub_core::{
    Notification, Notifier, QueueConfig, SchedulerError, SchedulerResult, Task, TaskRepository,
};
use taskhub_dispatcher::ScheduleReconciler;
use taskhub_infrastructure::{DatabaseManager, InMemoryQueueEngine};
use taskhub_worker::{
    CircuitBreaker, ErrorLedger, LifecycleManager, NotificationEscalator, TaskRegistry,
};

/// Notifier that keeps every alert it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> SchedulerResult<()> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Notifier whose channel is always down.
#[derive(Default)]
pub struct FailingNotifier {
    pub attempts: Mutex<u32>,
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> SchedulerResult<()> {
        *self.attempts.lock().await += 1;
        Err(SchedulerError::Notification("channel unavailable".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Task store that rejects every call.
pub struct BrokenTaskRepository;

#[async_trait]
impl TaskRepository for BrokenTaskRepository {
    async fn find_by_qualified_name(&self, _qualified_name: &str) -> SchedulerResult<Option<Task>> {
        Err(SchedulerError::database_error("database is locked"))
    }

    async fn find_by_id(&self, _id: i64) -> SchedulerResult<Option<Task>> {
        Err(SchedulerError::database_error("database is locked"))
    }

    async fn find_all(&self) -> SchedulerResult<Vec<Task>> {
        Err(SchedulerError::database_error("database is locked"))
    }

    async fn get_or_create(&self, _task: &Task) -> SchedulerResult<(Task, bool)> {
        Err(SchedulerError::database_error("database is locked"))
    }

    async fn save(&self, _task: &Task) -> SchedulerResult<Task> {
        Err(SchedulerError::database_error("database is locked"))
    }

    async fn update_declarative(&self, _task: &Task) -> SchedulerResult<Task> {
        Err(SchedulerError::database_error("database is locked"))
    }
}

/// Task store that reads normally but rejects every write.
pub struct ReadOnlyTaskRepository {
    pub inner: Arc<dyn TaskRepository>,
}

#[async_trait]
impl TaskRepository for ReadOnlyTaskRepository {
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
        self.inner.get_or_create(task).await
    }

    async fn save(&self, _task: &Task) -> SchedulerResult<Task> {
        Err(SchedulerError::database_error("attempt to write a readonly database"))
    }

    async fn update_declarative(&self, _task: &Task) -> SchedulerResult<Task> {
        Err(SchedulerError::database_error("attempt to write a readonly database"))
    }
}

pub struct Harness {
    pub db: DatabaseManager,
    pub reconciler: Arc<ScheduleReconciler>,
    pub lifecycle: Arc<LifecycleManager>,
    pub engine: Arc<InMemoryQueueEngine>,
    pub registry: TaskRegistry,
}

impl Harness {
    pub async fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_queue_config(notifier, QueueConfig::default()).await
    }

    pub async fn with_queue_config(notifier: Arc<dyn Notifier>, queue_config: QueueConfig) -> Self {
        let db = DatabaseManager::in_memory().await.unwrap();
        let task_repo = db.task_repository();
        let reconciler = Arc::new(ScheduleReconciler::new(
            task_repo.clone(),
            db.schedule_repository(),
        ));
        let lifecycle = Arc::new(LifecycleManager::new(
            task_repo.clone(),
            Arc::new(ErrorLedger::new(db.task_error_repository())),
            Arc::new(NotificationEscalator::new(notifier, Duration::from_secs(2))),
            Arc::new(CircuitBreaker::new(task_repo, reconciler.clone())),
        ));
        let engine = Arc::new(InMemoryQueueEngine::with_backoff_base(Duration::ZERO));
        let registry = TaskRegistry::new(
            reconciler.clone(),
            lifecycle.clone(),
            engine.clone(),
            queue_config,
        );
        Self {
            db,
            reconciler,
            lifecycle,
            engine,
            registry,
        }
    }

    pub async fn task(&self, qualified_name: &str) -> Task {
        self.db
            .task_repository()
            .find_by_qualified_name(qualified_name)
            .await
            .unwrap()
            .unwrap()
    }
}
