//! 作业函数抽象
//!
//! 作业是返回 `JobResult` 或 `JobError` 的异步函数。生命周期包装层只依赖这里的类型，
//! 不关心作业本身做什么。

use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;
use crate::models::task_error::ErrorTrace;

/// Value returned by a successful job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub message: String,
    pub count: Option<i64>,
}

impl JobResult {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            count: None,
        }
    }

    pub fn counted(message: impl Into<String>, count: i64) -> Self {
        Self {
            message: message.into(),
            count: Some(count),
        }
    }
}

impl From<String> for JobResult {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

impl From<&str> for JobResult {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<()> for JobResult {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// 作业执行失败
///
/// `kind` 是错误类型名，`trace` 记录抛出位置，二者共同构成错误台账的去重键。
/// 构造时通过 `#[track_caller]` 捕获文件与行号；函数名由 [`job_error!`](crate::job_error)
/// 填充，缺省时由生命周期层补上作业函数名。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    kind: String,
    message: String,
    trace: ErrorTrace,
}

impl JobError {
    #[track_caller]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: ErrorTrace {
                function_name: String::new(),
                file_path: location.file().to_string(),
                line_number: location.line(),
            },
        }
    }

    /// Wrap any error, naming it after its concrete type.
    #[track_caller]
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }

    pub fn in_function(mut self, function_name: impl Into<String>) -> Self {
        self.trace.function_name = function_name.into();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &ErrorTrace {
        &self.trace
    }

    /// Form stored in `Task::last_error` and sent in alerts.
    pub fn for_task(&self, task_name: &str) -> String {
        format!("Error in task {task_name}: {}", self.message)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {}

macro_rules! impl_job_error_from {
    ($($source:ty => $kind:literal),+ $(,)?) => {
        $(
            impl From<$source> for JobError {
                #[track_caller]
                fn from(err: $source) -> Self {
                    JobError::new($kind, err.to_string())
                }
            }
        )+
    };
}

impl_job_error_from! {
    std::io::Error => "IoError",
    serde_json::Error => "JsonError",
    SchedulerError => "SchedulerError",
    anyhow::Error => "Error",
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[doc(hidden)]
pub fn __type_name_of<T>(_: T) -> &'static str {
    std::any::type_name::<T>()
}

#[doc(hidden)]
pub fn __enclosing_function(path: &'static str) -> &'static str {
    let mut path = path.strip_suffix("::f").unwrap_or(path);
    while let Some(stripped) = path.strip_suffix("::{{closure}}") {
        path = stripped;
    }
    path.rsplit("::").next().unwrap_or(path)
}

/// Name of the enclosing function, closures and async blocks stripped.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        $crate::models::job::__enclosing_function($crate::models::job::__type_name_of(f))
    }};
}

/// Build a [`JobError`](crate::JobError) located at the call site:
/// `job_error!(ValueError, "widget {} missing", id)`.
#[macro_export]
macro_rules! job_error {
    ($kind:ident, $($arg:tt)+) => {
        $crate::JobError::new(stringify!($kind), format!($($arg)+))
            .in_function($crate::function_name!())
    };
}

/// Per-invocation input handed to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobContext {
    pub task_name: String,
    pub qualified_name: String,
    pub args: serde_json::Value,
}

pub type JobFuture = BoxFuture<'static, Result<JobResult, JobError>>;
pub type JobFn = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

/// A bare job function together with the module that declares it.
#[derive(Clone)]
pub struct Job {
    module_path: &'static str,
    function_name: &'static str,
    handler: JobFn,
}

impl Job {
    pub fn new<F, Fut>(module_path: &'static str, function_name: &'static str, handler: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobResult, JobError>> + Send + 'static,
    {
        Self {
            module_path,
            function_name,
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
        }
    }

    pub fn module_path(&self) -> &'static str {
        self.module_path
    }

    pub fn function_name(&self) -> &'static str {
        self.function_name
    }

    pub fn call(&self, ctx: JobContext) -> JobFuture {
        (self.handler)(ctx)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("module_path", &self.module_path)
            .field("function_name", &self.function_name)
            .finish_non_exhaustive()
    }
}

/// Wrap an async job function declared in the current module: `job!(sync_widgets)`.
#[macro_export]
macro_rules! job {
    ($func:ident) => {
        $crate::Job::new(module_path!(), stringify!($func), $func)
    };
}

/// Canonical identity of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskIdentity {
    /// First segment of the declaring module path.
    pub app: String,
    pub function_name: String,
    pub name: String,
    /// `<app>.tasks.<name>`
    pub qualified_name: String,
}

impl TaskIdentity {
    pub fn derive(module_path: &str, function_name: &str, name: Option<&str>) -> Self {
        let app = module_path
            .split("::")
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or("default")
            .to_string();

        let (name, qualified_name) = match name {
            Some(explicit) if explicit.contains('.') => {
                let short = explicit.rsplit('.').next().unwrap_or(explicit);
                (short.to_string(), explicit.to_string())
            }
            Some(explicit) => (explicit.to_string(), format!("{app}.tasks.{explicit}")),
            None => (
                function_name.to_string(),
                format!("{app}.tasks.{function_name}"),
            ),
        };

        Self {
            app,
            function_name: function_name.to_string(),
            name,
            qualified_name,
        }
    }

    pub fn for_job(job: &Job, name: Option<&str>) -> Self {
        Self::derive(job.module_path(), job.function_name(), name)
    }
}

/// What the wrapped executable hands back to the queue engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(JobResult),
    /// The task was inactive; nothing ran and nothing was written.
    Skipped,
}

impl TaskOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TaskOutcome::Skipped)
    }
}
