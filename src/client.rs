use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::common::models::{
    DOWNLOAD_METHOD, DownloadResponse, ListTaskRequest, ListTaskResponse, PostRequest,
    TASKS_ENDPOINT,
};
use crate::downloader::{DownloadError, ListCondition, TaskInfo, TaskState};

/// 访问远端文件服务器下载任务接口的客户端
#[derive(Debug, Clone)]
pub struct TaskClient {
    base_url: String,
    inner: Client,
}

impl TaskClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            inner,
        })
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("POST {}", url);

        let response = self.inner.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("请求失败 ({}): {}", status, text));
        }
        Ok(response.json().await?)
    }

    /// 在服务器的 dir 目录下创建一个下载任务，返回任务 id
    pub async fn add_download_task(&self, dir: &str, url: &str, name: Option<&str>) -> Result<String> {
        let req = PostRequest {
            url: url.to_string(),
            method: DOWNLOAD_METHOD.to_string(),
            name: name.unwrap_or_default().to_string(),
        };
        let resp: DownloadResponse = self.post_json(dir, &req).await?;
        Ok(resp.task_id)
    }

    pub async fn list_download_tasks(
        &self,
        task_ids: &[String],
        status: Option<TaskState>,
    ) -> Result<Vec<TaskInfo>> {
        let req = ListTaskRequest {
            or: vec![ListCondition {
                task_ids: task_ids.to_vec(),
                status,
            }],
        };
        let resp: ListTaskResponse = self.post_json(TASKS_ENDPOINT, &req).await?;
        Ok(resp.tasks)
    }

    pub async fn get_download_task_status(&self, task_id: &str) -> Result<TaskInfo> {
        let tasks = self
            .list_download_tasks(&[task_id.to_string()], None)
            .await?;
        tasks
            .into_iter()
            .next()
            .ok_or_else(|| DownloadError::TaskNotFound(task_id.to_string()).into())
    }

    /// 轮询任务直到进入终态，每次拿到新状态都会回调 on_update
    pub async fn wait_for_task<F>(
        &self,
        task_id: &str,
        interval: Duration,
        mut on_update: F,
    ) -> Result<TaskInfo>
    where
        F: FnMut(&TaskInfo),
    {
        loop {
            let task = self.get_download_task_status(task_id).await?;
            on_update(&task);
            if task.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(interval).await;
        }
    }
}
