use serde::{Deserialize, Serialize};

use crate::downloader::models::{ListCondition, TaskInfo};

// -----------------------------------------------------------------------------------------------
// HTTP 接口的请求/响应体，服务端和客户端共用

// POST /<dir> 的请求体
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostRequest {
    #[serde(default)]
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub task_id: String,
    pub filename: String,
}

// POST /:tasks 的请求体，多个条件之间是“或”的关系
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListTaskRequest {
    #[serde(default)]
    pub or: Vec<ListCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTaskResponse {
    pub tasks: Vec<TaskInfo>,
}

pub const DOWNLOAD_METHOD: &str = "download";
pub const TASKS_ENDPOINT: &str = ":tasks";
