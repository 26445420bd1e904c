use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use taskhub_core::{
    CrontabSpec, IntervalPeriod, IntervalSpec, PeriodicScheduleBinding, ScheduleKind,
    ScheduleRef, ScheduleRepository, ScheduleSpec, SchedulerError, SchedulerResult, SolarEvent,
    SolarSpec,
};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
use crate::repo_context;

const BINDING_COLUMNS: &str =
    "id, name, task, interval_id, crontab_id, solar_id, enabled, last_run_at, start_time, updated_at";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_binding(row: &SqliteRow) -> SchedulerResult<PeriodicScheduleBinding> {
        let interval_id: Option<i64> = row.try_get("interval_id")?;
        let crontab_id: Option<i64> = row.try_get("crontab_id")?;
        let solar_id: Option<i64> = row.try_get("solar_id")?;

        let schedule = match (interval_id, crontab_id, solar_id) {
            (Some(id), None, None) => ScheduleRef::Interval(id),
            (None, Some(id), None) => ScheduleRef::Crontab(id),
            (None, None, Some(id)) => ScheduleRef::Solar(id),
            _ => {
                return Err(SchedulerError::Internal(
                    "调度绑定必须且只能引用一条调度规则".to_string(),
                ))
            }
        };

        Ok(PeriodicScheduleBinding {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            task: row.try_get("task")?,
            schedule,
            enabled: row.try_get("enabled")?,
            last_run_at: row.try_get("last_run_at")?,
            start_time: row.try_get("start_time")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn schedule_columns(schedule: ScheduleRef) -> (Option<i64>, Option<i64>, Option<i64>) {
        match schedule {
            ScheduleRef::Interval(id) => (Some(id), None, None),
            ScheduleRef::Crontab(id) => (None, Some(id), None),
            ScheduleRef::Solar(id) => (None, None, Some(id)),
        }
    }

    async fn get_or_create_interval(&self, spec: &IntervalSpec) -> SchedulerResult<i64> {
        let context = repo_context!(RepositoryOperation::Upsert, "间隔调度");
        sqlx::query(
            "INSERT INTO interval_schedules (every, period) VALUES (?, ?) \
             ON CONFLICT (every, period) DO NOTHING",
        )
        .bind(spec.every)
        .bind(spec.period.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let id: i64 =
            sqlx::query_scalar("SELECT id FROM interval_schedules WHERE every = ? AND period = ?")
                .bind(spec.every)
                .bind(spec.period.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(id)
    }

    async fn get_or_create_crontab(&self, spec: &CrontabSpec) -> SchedulerResult<i64> {
        let context = repo_context!(RepositoryOperation::Upsert, "crontab 调度");
        sqlx::query(
            "INSERT INTO crontab_schedules (minute, hour, day_of_week, day_of_month, month_of_year) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (minute, hour, day_of_week, day_of_month, month_of_year) DO NOTHING",
        )
        .bind(&spec.minute)
        .bind(&spec.hour)
        .bind(&spec.day_of_week)
        .bind(&spec.day_of_month)
        .bind(&spec.month_of_year)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM crontab_schedules WHERE minute = ? AND hour = ? AND day_of_week = ? \
             AND day_of_month = ? AND month_of_year = ?",
        )
        .bind(&spec.minute)
        .bind(&spec.hour)
        .bind(&spec.day_of_week)
        .bind(&spec.day_of_month)
        .bind(&spec.month_of_year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(id)
    }

    async fn get_or_create_solar(&self, spec: &SolarSpec) -> SchedulerResult<i64> {
        let context = repo_context!(RepositoryOperation::Upsert, "太阳事件调度");
        sqlx::query(
            "INSERT INTO solar_schedules (event, latitude, longitude) VALUES (?, ?, ?) \
             ON CONFLICT (event, latitude, longitude) DO NOTHING",
        )
        .bind(spec.event.as_str())
        .bind(spec.latitude)
        .bind(spec.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        let id: i64 = sqlx::query_scalar(
            "SELECT id FROM solar_schedules WHERE event = ? AND latitude = ? AND longitude = ?",
        )
        .bind(spec.event.as_str())
        .bind(spec.latitude)
        .bind(spec.longitude)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(id)
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, spec), fields(kind = ?spec.kind()))]
    async fn get_or_create_spec(&self, spec: &ScheduleSpec) -> SchedulerResult<ScheduleRef> {
        let schedule = match spec {
            ScheduleSpec::Interval(interval) => {
                ScheduleRef::Interval(self.get_or_create_interval(interval).await?)
            }
            ScheduleSpec::Crontab(crontab) => {
                ScheduleRef::Crontab(self.get_or_create_crontab(crontab).await?)
            }
            ScheduleSpec::Solar(solar) => ScheduleRef::Solar(self.get_or_create_solar(solar).await?),
        };
        debug!("调度规则: {} -> {:?}", spec.display(), schedule);
        Ok(schedule)
    }

    async fn find_spec(&self, schedule: ScheduleRef) -> SchedulerResult<Option<ScheduleSpec>> {
        let context = repo_context!(RepositoryOperation::Read, "调度规则", schedule.id());
        let map_err = |e| RepositoryErrorHelpers::database_error(&context, e);

        let spec = match schedule {
            ScheduleRef::Interval(id) => {
                let row = sqlx::query("SELECT every, period FROM interval_schedules WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_err)?;
                match row {
                    Some(row) => {
                        let period: String = row.try_get("period")?;
                        Some(ScheduleSpec::Interval(IntervalSpec {
                            every: row.try_get("every")?,
                            period: period.parse::<IntervalPeriod>()?,
                        }))
                    }
                    None => None,
                }
            }
            ScheduleRef::Crontab(id) => {
                let row = sqlx::query(
                    "SELECT minute, hour, day_of_week, day_of_month, month_of_year \
                     FROM crontab_schedules WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
                match row {
                    Some(row) => Some(ScheduleSpec::Crontab(CrontabSpec {
                        minute: row.try_get("minute")?,
                        hour: row.try_get("hour")?,
                        day_of_week: row.try_get("day_of_week")?,
                        day_of_month: row.try_get("day_of_month")?,
                        month_of_year: row.try_get("month_of_year")?,
                    })),
                    None => None,
                }
            }
            ScheduleRef::Solar(id) => {
                let row = sqlx::query(
                    "SELECT event, latitude, longitude FROM solar_schedules WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
                match row {
                    Some(row) => {
                        let event: String = row.try_get("event")?;
                        Some(ScheduleSpec::Solar(SolarSpec {
                            event: event.parse::<SolarEvent>()?,
                            latitude: row.try_get("latitude")?,
                            longitude: row.try_get("longitude")?,
                        }))
                    }
                    None => None,
                }
            }
        };
        Ok(spec)
    }

    async fn count_specs(&self, kind: ScheduleKind) -> SchedulerResult<i64> {
        let table = match kind {
            ScheduleKind::Interval => "interval_schedules",
            ScheduleKind::Crontab => "crontab_schedules",
            ScheduleKind::Solar => "solar_schedules",
        };
        let context = repo_context!(RepositoryOperation::Query, "调度规则", table);
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;
        Ok(count)
    }

    async fn find_binding(&self, name: &str) -> SchedulerResult<Option<PeriodicScheduleBinding>> {
        let context = repo_context!(RepositoryOperation::Read, "调度绑定", name);
        let row = sqlx::query(&format!(
            "SELECT {BINDING_COLUMNS} FROM periodic_schedules WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_binding).transpose()
    }

    #[instrument(skip(self))]
    async fn upsert_binding(
        &self,
        name: &str,
        task: &str,
        schedule: ScheduleRef,
    ) -> SchedulerResult<(PeriodicScheduleBinding, bool)> {
        let context = repo_context!(RepositoryOperation::Upsert, "调度绑定", name);
        let (interval_id, crontab_id, solar_id) = Self::schedule_columns(schedule);
        let now = Utc::now();

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO periodic_schedules (name, task, interval_id, crontab_id, solar_id, enabled, updated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT (name) DO NOTHING
            RETURNING {BINDING_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(task)
        .bind(interval_id)
        .bind(crontab_id)
        .bind(solar_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        if let Some(row) = inserted {
            return Ok((Self::row_to_binding(&row)?, true));
        }

        // 已存在：只更新任务名与调度引用，启用状态归熔断器所有
        let row = sqlx::query(&format!(
            r#"
            UPDATE periodic_schedules
            SET task = ?, interval_id = ?, crontab_id = ?, solar_id = ?, updated_at = ?
            WHERE name = ?
            RETURNING {BINDING_COLUMNS}
            "#
        ))
        .bind(task)
        .bind(interval_id)
        .bind(crontab_id)
        .bind(solar_id)
        .bind(now)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        Ok((Self::row_to_binding(&row)?, false))
    }

    #[instrument(skip(self))]
    async fn set_binding_enabled(
        &self,
        name: &str,
        enabled: bool,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>> {
        let context = repo_context!(RepositoryOperation::Update, "调度绑定", name);
        let row = sqlx::query(&format!(
            "UPDATE periodic_schedules SET enabled = ?, updated_at = ? WHERE name = ? \
             RETURNING {BINDING_COLUMNS}"
        ))
        .bind(enabled)
        .bind(Utc::now())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_binding).transpose()
    }

    async fn record_binding_run(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> SchedulerResult<Option<PeriodicScheduleBinding>> {
        let context = repo_context!(RepositoryOperation::Update, "调度绑定", name);
        let row = sqlx::query(&format!(
            "UPDATE periodic_schedules SET last_run_at = ?, updated_at = ? WHERE name = ? \
             RETURNING {BINDING_COLUMNS}"
        ))
        .bind(at)
        .bind(Utc::now())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(&context, e))?;

        row.as_ref().map(Self::row_to_binding).transpose()
    }
}
