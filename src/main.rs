use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use taskhub::app::Application;
use taskhub_core::logging::init_logging;
use taskhub_core::{AppConfig, LogFormat};
use taskhub_worker::RunNowOutcome;

/// 任务生命周期与调度对账工具
#[derive(Parser, Debug)]
#[command(name = "taskhub")]
#[command(version)]
#[command(about = "共享任务生命周期与调度对账子系统")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogFormatArg {
    Json,
    Pretty,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Pretty => LogFormat::Pretty,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 对账所有注册任务的调度
    Reconcile,
    /// 列出任务状态
    List,
    /// 立即执行一次任务
    Run {
        /// 任务名称或限定名
        task: String,
        /// 任务参数 (JSON格式)
        #[arg(short, long)]
        args: Option<String>,
    },
    /// 重新启用被停用的任务
    Reset {
        /// 任务名称或限定名
        task: String,
    },
    /// 清除任务的所有未清除错误
    ClearErrors {
        /// 任务名称或限定名
        task: String,
        /// 操作人
        #[arg(long = "by")]
        actor: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    init_logging(&config.logging).context("初始化日志系统失败")?;

    let app = Application::new(config).await?;
    let tasks = app.reconcile().await?;
    info!("启动对账完成，共 {} 个任务", tasks.len());

    let result = execute(&app, cli.command).await;
    app.shutdown().await;
    result
}

async fn execute(app: &Application, command: Commands) -> Result<()> {
    match command {
        Commands::Reconcile => {
            for task in app.reconcile().await? {
                println!(
                    "{}\t{}\t{}",
                    task.qualified_name,
                    if task.is_active { "active" } else { "disabled" },
                    task.schedule
                );
            }
        }
        Commands::List => {
            println!("名称\t启用\t上次状态\t上次执行\t下次执行\t错误");
            for row in app.list(Utc::now()).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    row.name,
                    if row.active { "yes" } else { "no" },
                    row.last_status,
                    row.last_run,
                    row.next_run,
                    row.errors
                );
            }
        }
        Commands::Run { task, args } => {
            let args = match args {
                Some(raw) => serde_json::from_str(&raw).context("任务参数不是有效的JSON")?,
                None => serde_json::Value::Null,
            };
            match app.run(&task, args).await? {
                RunNowOutcome::Enqueued => println!("任务已执行: {task}"),
                RunNowOutcome::Skipped => println!("任务已停用，未执行: {task}"),
            }
        }
        Commands::Reset { task } => {
            let task = app.reset(&task).await?;
            println!("任务已重新启用: {}", task.qualified_name);
        }
        Commands::ClearErrors { task, actor } => {
            let cleared = app.clear_errors(&task, &actor).await?;
            println!("已清除 {cleared} 条错误记录: {task}");
        }
    }
    Ok(())
}
