pub mod client;
pub mod common;
pub mod downloader;

#[cfg(feature = "http")]
pub mod server;

pub use client::TaskClient;
pub use downloader::{DownloadError, DownloadManager, ManagerConfig, TaskInfo, TaskState};
