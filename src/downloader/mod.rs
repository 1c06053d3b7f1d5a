//! 远程下载任务子系统
//!
//! - [`store`]: 任务表，所有状态的唯一持有者
//! - [`core`]: 执行一次 HTTP 下载并写回终态
//! - [`progress`]: 周期性采样下载进度
//! - [`manager`]: 对外接口，创建任务并响应查询

pub mod core;
pub mod error;
pub mod manager;
pub mod models;
pub mod progress;
pub mod store;

pub use error::DownloadError;
pub use manager::{DownloadManager, ManagerConfig};
pub use models::{DownloadStatus, ListCondition, TaskInfo, TaskState};
pub use progress::{format_size, format_speed};
pub use store::{TaskStore, UpdateOutcome};
