use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fileserver::TaskState;

/// 自托管文件服务器
#[derive(Parser, Debug)]
#[command(name = "fileserver")]
#[command(version)]
#[command(about = "一个简单的自托管文件服务器，支持远程下载任务", long_about = None)]
pub struct Cli {
    /// 日志级别 (trace/debug/info/warn/error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 启动 HTTP 服务
    Serve(ServeArgs),
    /// 在远端服务器上创建下载任务
    Fetch(FetchArgs),
    /// 查看远端服务器上的下载任务
    Tasks(TasksArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// 监听端口
    #[arg(short, long, default_value_t = 9008)]
    pub port: u16,

    /// 根目录
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub dir: PathBuf,

    /// 已结束任务的保留天数
    #[arg(long, default_value_t = 1)]
    pub retention_days: u64,

    /// 清理过期任务的间隔（小时）
    #[arg(long, default_value_t = 24)]
    pub cleanup_interval_hours: u64,

    /// 下载进度采样间隔（毫秒）
    #[arg(long, default_value_t = 500)]
    pub sample_interval_ms: u64,

    /// 单个下载任务的超时时间（秒），不指定则不限制
    #[arg(long, value_name = "SECS")]
    pub task_timeout_secs: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// 文件服务器地址
    #[arg(long, default_value = "http://127.0.0.1:9008")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub server: String,

    /// 要下载的远程链接
    #[arg(long, value_name = "URL")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub url: String,

    /// 服务器上的目标目录（相对于根目录）
    #[arg(long, default_value = "/")]
    pub dir: String,

    /// 保存的文件名，不指定则从链接推导
    #[arg(long)]
    pub name: Option<String>,

    /// 等待下载完成并显示进度
    #[arg(long)]
    pub wait: bool,
}

#[derive(Parser, Debug)]
pub struct TasksArgs {
    /// 文件服务器地址
    #[arg(long, default_value = "http://127.0.0.1:9008")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub server: String,

    /// 只显示指定 id 的任务（可重复）
    #[arg(long = "id", value_name = "TASK_ID")]
    pub ids: Vec<String>,

    /// 按状态过滤: pending/downloading/finished/failed
    #[arg(long)]
    pub status: Option<TaskState>,
}
