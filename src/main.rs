use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use fileserver::common::logger::PrettyLogger;
use fileserver::{TaskClient, TaskState, log_error, log_info, log_success};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

mod cli;

use cli::{Cli, Command, FetchArgs, ServeArgs, TasksArgs};

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[cfg(feature = "http")]
async fn serve(args: ServeArgs) -> Result<()> {
    use std::net::SocketAddr;

    use fileserver::{DownloadManager, ManagerConfig};

    let config = ManagerConfig {
        root_dir: args.dir,
        sample_interval: Duration::from_millis(args.sample_interval_ms.max(1)),
        task_timeout: args.task_timeout_secs.map(Duration::from_secs),
        ..ManagerConfig::default()
    };
    let manager = DownloadManager::new(config)?;

    let retention = DAY * u32::try_from(args.retention_days).unwrap_or(u32::MAX);
    let every = HOUR * u32::try_from(args.cleanup_interval_hours.max(1)).unwrap_or(u32::MAX);
    let cleanup = manager.spawn_retention_job(every, retention);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let shutdown_manager = manager.clone();
    fileserver::server::serve(manager, addr, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("监听退出信号失败: {}", e);
        }
        shutdown_manager.shutdown();
    })
    .await?;

    cleanup.await?;
    info!("服务已退出");
    Ok(())
}

#[cfg(not(feature = "http"))]
async fn serve(_args: ServeArgs) -> Result<()> {
    anyhow::bail!("未启用 http 功能，无法启动服务")
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let client = TaskClient::new(&args.server)?;
    let task_id = client
        .add_download_task(&args.dir, &args.url, args.name.as_deref())
        .await?;
    log_success!("已创建下载任务: {}", task_id);

    if !args.wait {
        return Ok(());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )?
        .progress_chars("#>-"),
    );

    let task = client
        .wait_for_task(&task_id, Duration::from_millis(500), |task| {
            if task.status.total_size > 0 {
                pb.set_length(task.status.total_size);
            }
            pb.set_position(task.status.downloaded);
            pb.set_message(task.status.speed.clone());
        })
        .await?;

    match task.state() {
        TaskState::Finished => {
            pb.finish_with_message("下载完成");
            log_success!("文件已保存到: {}", task.file_path);
        }
        _ => {
            pb.abandon_with_message("下载失败");
            log_error!(
                "下载失败: {}",
                task.status.err_msg.as_deref().unwrap_or("未知错误")
            );
        }
    }
    Ok(())
}

async fn tasks(args: TasksArgs) -> Result<()> {
    let client = TaskClient::new(&args.server)?;
    let tasks = client.list_download_tasks(&args.ids, args.status).await?;
    debug!("共查询到 {} 个任务", tasks.len());

    if tasks.is_empty() {
        log_info!("没有匹配的任务");
        return Ok(());
    }
    PrettyLogger::separator();
    for task in &tasks {
        PrettyLogger::task(task);
    }
    PrettyLogger::separator();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    match args.command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Fetch(fetch_args) => fetch(fetch_args).await,
        Command::Tasks(tasks_args) => tasks(tasks_args).await,
    }
}
