use colored::*;

use crate::downloader::{TaskInfo, TaskState, format_size};

/// 命令行输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        eprintln!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }

    /// 显示一个任务的摘要
    pub fn task(task: &TaskInfo) {
        let state = match task.state() {
            TaskState::Pending => "pending".bright_black(),
            TaskState::Downloading => "downloading".cyan(),
            TaskState::Finished => "finished".green(),
            TaskState::Failed => "failed".red(),
        };
        let progress = if task.status.total_size > 0 {
            format!(
                "{}/{}",
                format_size(task.status.downloaded),
                format_size(task.status.total_size)
            )
        } else {
            format_size(task.status.downloaded)
        };

        println!(
            "{} {} [{}] {} {}",
            "⬇".blue().bold(),
            task.task_id.bright_black(),
            state,
            task.file_path.bold(),
            progress
        );
        if let Some(err) = &task.status.err_msg {
            println!("    {}", err.red());
        }
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}
