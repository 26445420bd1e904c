use std::io::Write;

use chrono::Utc;
use taskhub::app::Application;
use taskhub_core::AppConfig;
use taskhub_worker::RunNowOutcome;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> String {
    let path = dir.path().join("taskhub.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        r#"
[database]
url = "sqlite://{}"
max_connections = 2
connection_timeout_seconds = 5

{extra}
"#,
        dir.path().join("taskhub.db").display()
    )
    .unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_reconcile_is_idempotent_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "");

    let app = Application::new(AppConfig::load(Some(&path)).unwrap())
        .await
        .unwrap();
    let first = app.reconcile().await.unwrap();
    app.shutdown().await;

    let app = Application::new(AppConfig::load(Some(&path)).unwrap())
        .await
        .unwrap();
    let second = app.reconcile().await.unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(app.list(Utc::now()).await.unwrap().len(), 1);
    app.shutdown().await;
}

#[tokio::test]
async fn test_app_queue_routing_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[queue]
default_queue = "celery"
app_queues = ["taskhub"]
"#,
    );

    let app = Application::new(AppConfig::load(Some(&path)).unwrap())
        .await
        .unwrap();
    let options = app.registry().options_for("heartbeat").await.unwrap();
    assert_eq!(options.queue, "taskhub_queue");

    let outcome = app.run("heartbeat", serde_json::Value::Null).await.unwrap();
    assert_eq!(outcome, RunNowOutcome::Enqueued);
    let rows = app.list(Utc::now()).await.unwrap();
    assert_eq!(rows[0].last_status, "success");
    assert_eq!(rows[0].last_run, "just now");
    app.shutdown().await;
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    assert!(AppConfig::load(Some("/nonexistent/taskhub.toml")).is_err());
}
