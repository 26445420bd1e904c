use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;

/// Unit of an interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalPeriod {
    Days,
    Hours,
    Minutes,
    Seconds,
    Microseconds,
}

impl IntervalPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalPeriod::Days => "days",
            IntervalPeriod::Hours => "hours",
            IntervalPeriod::Minutes => "minutes",
            IntervalPeriod::Seconds => "seconds",
            IntervalPeriod::Microseconds => "microseconds",
        }
    }

    fn micros_per_unit(&self) -> i64 {
        match self {
            IntervalPeriod::Days => 86_400_000_000,
            IntervalPeriod::Hours => 3_600_000_000,
            IntervalPeriod::Minutes => 60_000_000,
            IntervalPeriod::Seconds => 1_000_000,
            IntervalPeriod::Microseconds => 1,
        }
    }

    /// Fixed length of `every` units, `None` when it does not fit a duration.
    pub fn duration(&self, every: i64) -> Option<Duration> {
        every
            .checked_mul(self.micros_per_unit())
            .map(Duration::microseconds)
    }
}

impl fmt::Display for IntervalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalPeriod {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "days" => Ok(IntervalPeriod::Days),
            "hours" => Ok(IntervalPeriod::Hours),
            "minutes" => Ok(IntervalPeriod::Minutes),
            "seconds" => Ok(IntervalPeriod::Seconds),
            "microseconds" => Ok(IntervalPeriod::Microseconds),
            other => Err(SchedulerError::config_error(format!(
                "未知的间隔单位: {other}"
            ))),
        }
    }
}

/// Solar events a solar schedule can fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolarEvent {
    DawnAstronomical,
    DawnNautical,
    DawnCivil,
    Sunrise,
    SolarNoon,
    Sunset,
    DuskCivil,
    DuskNautical,
    DuskAstronomical,
}

impl SolarEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolarEvent::DawnAstronomical => "dawn_astronomical",
            SolarEvent::DawnNautical => "dawn_nautical",
            SolarEvent::DawnCivil => "dawn_civil",
            SolarEvent::Sunrise => "sunrise",
            SolarEvent::SolarNoon => "solar_noon",
            SolarEvent::Sunset => "sunset",
            SolarEvent::DuskCivil => "dusk_civil",
            SolarEvent::DuskNautical => "dusk_nautical",
            SolarEvent::DuskAstronomical => "dusk_astronomical",
        }
    }
}

impl fmt::Display for SolarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolarEvent {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event = match s {
            "dawn_astronomical" => SolarEvent::DawnAstronomical,
            "dawn_nautical" => SolarEvent::DawnNautical,
            "dawn_civil" => SolarEvent::DawnCivil,
            "sunrise" => SolarEvent::Sunrise,
            "solar_noon" => SolarEvent::SolarNoon,
            "sunset" => SolarEvent::Sunset,
            "dusk_civil" => SolarEvent::DuskCivil,
            "dusk_nautical" => SolarEvent::DuskNautical,
            "dusk_astronomical" => SolarEvent::DuskAstronomical,
            other => {
                return Err(SchedulerError::config_error(format!(
                    "未知的太阳事件: {other}"
                )))
            }
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalSpec {
    pub every: i64,
    pub period: IntervalPeriod,
}

/// Five crontab fields in the periodic scheduler's conventions
/// (day_of_week 0-6 with Sunday = 0).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrontabSpec {
    pub minute: String,
    pub hour: String,
    pub day_of_week: String,
    pub day_of_month: String,
    pub month_of_year: String,
}

impl Default for CrontabSpec {
    fn default() -> Self {
        Self {
            minute: "*".to_string(),
            hour: "*".to_string(),
            day_of_week: "*".to_string(),
            day_of_month: "*".to_string(),
            month_of_year: "*".to_string(),
        }
    }
}

impl CrontabSpec {
    pub fn minute(mut self, value: impl Into<String>) -> Self {
        self.minute = value.into();
        self
    }
    pub fn hour(mut self, value: impl Into<String>) -> Self {
        self.hour = value.into();
        self
    }
    pub fn day_of_week(mut self, value: impl Into<String>) -> Self {
        self.day_of_week = value.into();
        self
    }
    pub fn day_of_month(mut self, value: impl Into<String>) -> Self {
        self.day_of_month = value.into();
        self
    }
    pub fn month_of_year(mut self, value: impl Into<String>) -> Self {
        self.month_of_year = value.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarSpec {
    pub event: SolarEvent,
    pub latitude: f64,
    pub longitude: f64,
}

/// 调度规则
///
/// 三种形式之一：固定间隔、crontab 或太阳事件。字段完全相同的规则在存储中共享同一行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleSpec {
    Interval(IntervalSpec),
    Crontab(CrontabSpec),
    Solar(SolarSpec),
}

impl ScheduleSpec {
    pub fn every(every: i64, period: IntervalPeriod) -> Self {
        ScheduleSpec::Interval(IntervalSpec { every, period })
    }

    pub fn crontab(spec: CrontabSpec) -> Self {
        ScheduleSpec::Crontab(spec)
    }

    pub fn solar(event: SolarEvent, latitude: f64, longitude: f64) -> Self {
        ScheduleSpec::Solar(SolarSpec {
            event,
            latitude,
            longitude,
        })
    }

    pub fn kind(&self) -> ScheduleKind {
        match self {
            ScheduleSpec::Interval(_) => ScheduleKind::Interval,
            ScheduleSpec::Crontab(_) => ScheduleKind::Crontab,
            ScheduleSpec::Solar(_) => ScheduleKind::Solar,
        }
    }

    /// Human-readable rendering stored on the task record.
    pub fn display(&self) -> String {
        match self {
            ScheduleSpec::Interval(interval) => {
                format!("Every {} {}", interval.every, interval.period)
            }
            ScheduleSpec::Crontab(cron) => format!(
                "{} {} {} {} {} (m/h/dM/MY/d)",
                cron.minute, cron.hour, cron.day_of_month, cron.month_of_year, cron.day_of_week
            ),
            ScheduleSpec::Solar(solar) => {
                format!("{} ({}, {})", solar.event, solar.latitude, solar.longitude)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    Interval,
    Crontab,
    Solar,
}

/// Reference to a persisted schedule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleRef {
    Interval(i64),
    Crontab(i64),
    Solar(i64),
}

impl ScheduleRef {
    pub fn kind(&self) -> ScheduleKind {
        match self {
            ScheduleRef::Interval(_) => ScheduleKind::Interval,
            ScheduleRef::Crontab(_) => ScheduleKind::Crontab,
            ScheduleRef::Solar(_) => ScheduleKind::Solar,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ScheduleRef::Interval(id) | ScheduleRef::Crontab(id) | ScheduleRef::Solar(id) => *id,
        }
    }
}

/// 周期调度绑定
///
/// 将任务的限定名与一条调度规则关联，`enabled` 必须始终与 `Task::is_active` 一致，
/// 该一致性只通过一条显式同步路径维护。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicScheduleBinding {
    pub id: i64,
    pub name: String,
    pub task: String,
    pub schedule: ScheduleRef,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
