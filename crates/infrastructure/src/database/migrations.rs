use sqlx::SqlitePool;
use tracing::debug;

use taskhub_core::SchedulerResult;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        qualified_name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        is_active INTEGER NOT NULL DEFAULT 1,
        notify_on_error INTEGER NOT NULL DEFAULT 1,
        disable_on_error INTEGER NOT NULL DEFAULT 0,
        max_retries INTEGER NOT NULL DEFAULT 3,
        schedule TEXT NOT NULL DEFAULT '',
        last_run TEXT,
        last_status TEXT NOT NULL DEFAULT '',
        last_result TEXT NOT NULL DEFAULT '',
        last_error TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interval_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        every INTEGER NOT NULL,
        period TEXT NOT NULL,
        UNIQUE (every, period)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crontab_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        minute TEXT NOT NULL,
        hour TEXT NOT NULL,
        day_of_week TEXT NOT NULL,
        day_of_month TEXT NOT NULL,
        month_of_year TEXT NOT NULL,
        UNIQUE (minute, hour, day_of_week, day_of_month, month_of_year)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS solar_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        UNIQUE (event, latitude, longitude)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS periodic_schedules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        task TEXT NOT NULL,
        interval_id INTEGER REFERENCES interval_schedules(id),
        crontab_id INTEGER REFERENCES crontab_schedules(id),
        solar_id INTEGER REFERENCES solar_schedules(id),
        enabled INTEGER NOT NULL DEFAULT 1,
        last_run_at TEXT,
        start_time TEXT,
        updated_at TEXT NOT NULL,
        CHECK (
            (interval_id IS NOT NULL) + (crontab_id IS NOT NULL) + (solar_id IS NOT NULL) = 1
        )
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_errors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        error_type TEXT NOT NULL,
        error_message TEXT NOT NULL,
        function_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        line_number INTEGER NOT NULL,
        occurrence_count INTEGER NOT NULL DEFAULT 1,
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        regressed_at TEXT,
        cleared INTEGER NOT NULL DEFAULT 0,
        cleared_at TEXT,
        cleared_by TEXT
    )
    "#,
];

const INDEXES: &[&str] = &[
    // 每个错误键至多一条未清除记录，upsert 依赖它做冲突检测
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_task_errors_open_key
        ON task_errors (task_id, error_type, function_name, file_path, line_number)
        WHERE cleared = 0
    "#,
    "CREATE INDEX IF NOT EXISTS idx_task_errors_task_id ON task_errors(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_errors_last_seen ON task_errors(last_seen)",
    "CREATE INDEX IF NOT EXISTS idx_periodic_schedules_task ON periodic_schedules(task)",
];

/// 运行数据库迁移，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    for table_sql in TABLES {
        sqlx::query(table_sql).execute(pool).await?;
    }
    for index_sql in INDEXES {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
