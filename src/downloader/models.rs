use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// --------------------------------------------------------------------
// 任务状态机: Pending -> Downloading -> Finished | Failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Downloading,
    Finished,
    Failed,
}

impl TaskState {
    /// Finished 和 Failed 是终态，进入后不再变化
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Downloading => "downloading",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "downloading" => Ok(TaskState::Downloading),
            "finished" => Ok(TaskState::Finished),
            "failed" => Ok(TaskState::Failed),
            other => Err(format!("未知的任务状态: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DownloadStatus {
    pub status: TaskState,
    #[serde(rename = "totalsize")]
    pub total_size: u64,
    pub downloaded: u64,
    pub speed: String,
    /// 线上格式里未失败的任务为空字符串
    #[serde(
        rename = "errMsg",
        default,
        serialize_with = "none_as_empty",
        deserialize_with = "empty_as_none"
    )]
    pub err_msg: Option<String>,
}

/// 一个远程下载任务的完整状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: String,
    pub url: String,
    pub filename: String,
    /// 相对于根目录的路径
    #[serde(rename = "filepath")]
    pub file_path: String,
    #[serde(skip)]
    pub destination: PathBuf,
    pub status: DownloadStatus,
    pub started_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

impl TaskInfo {
    pub fn state(&self) -> TaskState {
        self.status.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.status.is_terminal()
    }
}

/// 创建任务时由调用方提供的不可变字段
#[derive(Debug, Clone)]
pub struct NewTask {
    pub url: String,
    pub filename: String,
    pub file_path: String,
    pub destination: PathBuf,
}

/// 列表查询条件：task_ids 为空表示匹配全部，status 为空表示不过滤状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListCondition {
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default, deserialize_with = "empty_status_as_none")]
    pub status: Option<TaskState>,
}

impl ListCondition {
    pub fn status(status: TaskState) -> Self {
        Self {
            task_ids: Vec::new(),
            status: Some(status),
        }
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_ids: ids.into_iter().map(Into::into).collect(),
            status: None,
        }
    }

    pub fn matches(&self, task: &TaskInfo) -> bool {
        let id_ok = self.task_ids.is_empty() || self.task_ids.iter().any(|id| *id == task.task_id);
        let status_ok = self.status.is_none_or(|s| s == task.state());
        id_ok && status_ok
    }
}

fn empty_status_as_none<'de, D>(deserializer: D) -> Result<Option<TaskState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn none_as_empty<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}
