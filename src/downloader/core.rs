use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::DownloadError;
use super::models::TaskState;
use super::store::{TaskStore, UpdateOutcome};

/// 传输过程中的实时字节计数，由执行器写入，采样器读取
#[derive(Debug, Default)]
pub struct TransferCounters {
    downloaded: AtomicU64,
    total: AtomicU64,
}

impl TransferCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// 0 表示总大小未知
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    fn add(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::AcqRel);
    }

    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }
}

/// 单个任务的下载作业，spawn 时就绑定好 task_id
pub struct TransferJob {
    pub task_id: String,
    pub url: String,
    pub destination: PathBuf,
    pub counters: Arc<TransferCounters>,
    /// 外部取消（管理器关闭）
    pub cancel: CancellationToken,
    /// 任务结束时触发，通知采样器停止
    pub done: CancellationToken,
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct TransferExecutor {
    client: Client,
}

impl TransferExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// 执行一次下载并把唯一的终态结果写回任务表。
    ///
    /// 不重试；失败时已写入的部分文件保留原样。
    pub async fn run(&self, store: Arc<TaskStore>, job: TransferJob) {
        info!("开始下载任务: {} <- {}", job.task_id, job.url);

        let transfer = self.transfer(&job.url, &job.destination, &job.counters);
        let result = tokio::select! {
            _ = job.cancel.cancelled() => Err(DownloadError::Cancelled),
            result = with_deadline(transfer, job.timeout) => result,
        };

        let downloaded = job.counters.downloaded();
        let total = job.counters.total();
        let outcome = match &result {
            Ok(()) => store.update(&job.task_id, |task| {
                task.status.status = TaskState::Finished;
                task.status.downloaded = downloaded;
                task.status.total_size = if total > 0 { total } else { downloaded };
            }),
            Err(e) => {
                let message = e.to_string();
                store.update(&job.task_id, |task| {
                    task.status.status = TaskState::Failed;
                    task.status.downloaded = downloaded;
                    task.status.total_size = total;
                    task.status.err_msg = Some(message);
                })
            }
        };

        match (&result, outcome) {
            (Ok(()), UpdateOutcome::Applied) => {
                info!("✅ 下载任务完成: {}, 共 {} 字节", job.task_id, downloaded)
            }
            (Err(e), UpdateOutcome::Applied) => {
                error!("❌ 下载任务失败: {}, 错误: {}", job.task_id, e)
            }
            (_, other) => debug!("任务 {} 的终态结果被忽略: {:?}", job.task_id, other),
        }

        job.done.cancel();
    }

    async fn transfer(
        &self,
        url: &str,
        output_path: &Path,
        counters: &TransferCounters,
    ) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status));
        }

        if let Some(total) = response.content_length() {
            counters.set_total(total);
        }

        let mut file = tokio::fs::File::create(output_path).await?;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            counters.add(chunk.len() as u64);
        }

        file.flush().await?;
        debug!("文件写入完成: {}", output_path.display());
        Ok(())
    }
}

async fn with_deadline<F>(transfer: F, timeout: Option<Duration>) -> Result<(), DownloadError>
where
    F: Future<Output = Result<(), DownloadError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .unwrap_or(Err(DownloadError::Timeout(limit))),
        None => transfer.await,
    }
}
