//! 下一次执行时间的推算

use chrono::{DateTime, Duration, Utc};

use taskhub_core::{IntervalSpec, PeriodicScheduleBinding, ScheduleSpec};

use crate::cron_utils::CronScheduler;

/// 推算下一次执行时间
///
/// 绑定缺失或已禁用时返回 `None`；从未执行过的绑定以 `now` 作为上次执行时间。
/// 太阳事件调度不做推算。
pub fn next_run(
    spec: &ScheduleSpec,
    binding: Option<&PeriodicScheduleBinding>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let binding = binding.filter(|binding| binding.enabled)?;
    let last_run = binding.last_run_at.unwrap_or(now);

    match spec {
        ScheduleSpec::Interval(interval) => next_interval_run(interval, last_run, now),
        ScheduleSpec::Crontab(crontab) => CronScheduler::from_crontab(crontab)
            .ok()?
            .first_at_or_after(now),
        ScheduleSpec::Solar(_) => None,
    }
}

/// 按固定周期对齐到 `last_run` 的网格，取不早于 `now` 的最小网格点
pub fn next_interval_run(
    interval: &IntervalSpec,
    last_run: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let period = interval.period.duration(interval.every)?;
    if period <= Duration::zero() {
        return None;
    }

    let first = last_run.checked_add_signed(period)?;
    if first >= now {
        return Some(first);
    }

    let period_micros = period.num_microseconds()?;
    let elapsed_micros = (now - last_run).num_microseconds()?;
    let periods = elapsed_micros / period_micros + 1;
    let offset = period_micros.checked_mul(periods)?;
    last_run.checked_add_signed(Duration::microseconds(offset))
}
