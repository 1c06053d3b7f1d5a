use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("目标路径越界: {}", .0.display())]
    PathViolation(PathBuf),

    #[error("目标目录不存在: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("任务未找到: {0}")]
    TaskNotFound(String),

    #[error("任务已存在: {0}")]
    TaskAlreadyExists(String),

    #[error("服务器返回错误状态: {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("HTTP错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("下载超时 ({0:?})")]
    Timeout(Duration),

    #[error("下载已取消")]
    Cancelled,
}

