use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;

/// Where in the job code a failure was raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorTrace {
    pub function_name: String,
    pub file_path: String,
    pub line_number: u32,
}

/// 错误记录状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatus {
    /// 首次出现
    #[default]
    New,
    /// 后续执行中再次出现
    Ongoing,
    /// 之前出现过，但最近一次执行成功
    Regressed,
    /// 已由操作员清除
    Cleared,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::New => "new",
            ErrorStatus::Ongoing => "ongoing",
            ErrorStatus::Regressed => "regressed",
            ErrorStatus::Cleared => "cleared",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ErrorStatus::New),
            "ongoing" => Ok(ErrorStatus::Ongoing),
            "regressed" => Ok(ErrorStatus::Regressed),
            "cleared" => Ok(ErrorStatus::Cleared),
            other => Err(SchedulerError::Serialization(format!(
                "Invalid error status: {other}"
            ))),
        }
    }
}

/// One failure occurrence, before it is folded into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOccurrence {
    pub task_id: i64,
    pub error_type: String,
    pub error_message: String,
    pub trace: ErrorTrace,
    pub seen_at: DateTime<Utc>,
}

/// 聚合后的任务错误记录
///
/// 以 `(task, error_type, function_name, file_path, line_number)` 为键，
/// 同一键最多存在一条未清除记录；重复出现只增加 `occurrence_count`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub id: i64,
    pub task_id: i64,
    pub error_type: String,
    pub error_message: String,
    pub function_name: String,
    pub file_path: String,
    pub line_number: u32,
    pub occurrence_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: ErrorStatus,
    pub regressed_at: Option<DateTime<Utc>>,
    pub cleared: bool,
    pub cleared_at: Option<DateTime<Utc>>,
    pub cleared_by: Option<String>,
}

impl TaskError {
    pub fn is_open(&self) -> bool {
        !self.cleared
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} ({} times)",
            self.error_type, self.function_name, self.occurrence_count
        )
    }
}
