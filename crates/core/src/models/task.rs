use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;
use crate::display::format_timedelta;
use crate::errors::SchedulerError;
use crate::models::job::TaskIdentity;

/// 任务定义
///
/// 一个具名后台作业的持久化配置与运行状态。
///
/// # 字段说明
///
/// - `name`: 短名称，用于展示和告警标题
/// - `qualified_name`: 全局唯一的限定名 (`<app>.tasks.<name>`)，同时是调度绑定的键
/// - `is_active`/`notify_on_error`/`disable_on_error`/`max_retries`: 策略字段
/// - `schedule`: 调度规则的可读描述
/// - `last_run`/`last_status`/`last_result`/`last_error`: 运行状态
///
/// 同一任务的并发执行共享这一行记录，写入采用"读取-修改-写回"，后写者生效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub qualified_name: String,
    pub description: String,
    pub is_active: bool,
    pub notify_on_error: bool,
    pub disable_on_error: bool,
    pub max_retries: i32,
    pub schedule: String,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: TaskStatus,
    pub last_result: String,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Status of the most recent execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    None,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::None => "none",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(TaskStatus::None),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "error" => Ok(TaskStatus::Error),
            other => Err(SchedulerError::Serialization(format!(
                "Invalid task status: {other}"
            ))),
        }
    }
}

impl Task {
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            name: name.into(),
            qualified_name: qualified_name.into(),
            description: String::new(),
            is_active: true,
            notify_on_error: true,
            disable_on_error: false,
            max_retries: 3,
            schedule: String::new(),
            last_run: None,
            last_status: TaskStatus::None,
            last_result: String::new(),
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a fresh record from a registration, copying every policy field.
    pub fn from_config(identity: &TaskIdentity, config: &TaskConfig) -> Self {
        let mut task = Self::new(identity.name.clone(), identity.qualified_name.clone());
        task.apply_declarative(config);
        task
    }

    /// Overwrite the declarative fields only. `is_active` belongs to the circuit breaker
    /// and the runtime-state fields belong to the lifecycle, so neither is touched here.
    pub fn apply_declarative(&mut self, config: &TaskConfig) {
        self.description = config.description.clone().unwrap_or_default();
        self.notify_on_error = config.notify_on_error;
        self.disable_on_error = config.disable_on_error;
        self.max_retries = config.max_retries as i32;
        self.schedule = config
            .schedule
            .as_ref()
            .map(|spec| spec.display())
            .unwrap_or_default();
    }

    /// "3m ago", "2hr 5m ago", "just now" or "never".
    pub fn last_run_display(&self, now: DateTime<Utc>) -> String {
        match self.last_run {
            None => "never".to_string(),
            Some(last_run) => {
                let elapsed = format_timedelta(Some(now - last_run));
                if elapsed == "just now" {
                    elapsed
                } else {
                    format!("{elapsed} ago")
                }
            }
        }
    }

    pub fn entity_description(&self) -> String {
        format!("任务 '{}' (ID: {}, 限定名: {})", self.name, self.id, self.qualified_name)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
