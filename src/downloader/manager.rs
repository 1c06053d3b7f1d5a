use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::core::{TransferCounters, TransferExecutor, TransferJob};
use super::error::DownloadError;
use super::models::{ListCondition, NewTask, TaskInfo, TaskState};
use super::progress::ProgressSampler;
use super::store::TaskStore;
use crate::common::utils::{
    filename_from_url, is_sub_path, numbered_filename, resolve_within_root, sanitize_filename,
};

// 同名文件最多尝试的编号数
const MAX_NAME_ATTEMPTS: usize = 1000;
// tokio interval 不接受零周期
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// 所有下载目标都必须位于此目录内
    pub root_dir: PathBuf,
    pub sample_interval: Duration,
    /// 单个任务的最长下载时间，None 表示不限制
    pub task_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            sample_interval: Duration::from_millis(500),
            task_timeout: None,
            user_agent: format!("fileserver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// 远程下载任务的对外入口。
///
/// 自身不持有任务状态，所有读写都委托给 [`TaskStore`]。
/// clone 开销很小，clone 出来的实例共享同一个任务表。
#[derive(Clone)]
pub struct DownloadManager {
    store: Arc<TaskStore>,
    executor: TransferExecutor,
    root: PathBuf,
    sample_interval: Duration,
    task_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl DownloadManager {
    pub fn new(config: ManagerConfig) -> Result<Self, DownloadError> {
        let root = std::fs::canonicalize(&config.root_dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DownloadError::DirectoryNotFound(config.root_dir.clone()),
            _ => DownloadError::Io(e),
        })?;
        let client = Client::builder().user_agent(config.user_agent).build()?;

        info!("下载管理器已创建，根目录: {}", root.display());
        Ok(Self {
            store: Arc::new(TaskStore::new()),
            executor: TransferExecutor::new(client),
            root,
            sample_interval: config.sample_interval.max(MIN_INTERVAL),
            task_timeout: config.task_timeout,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 添加新的下载任务，立即返回任务 id，不等待任何网络 IO。
    ///
    /// `dir` 是相对于根目录的目标目录，越出根目录时同步返回 PathViolation。
    pub async fn add_task(&self, url: &str, dir: &str) -> Result<String, DownloadError> {
        self.add_task_with_name(url, dir, None).await
    }

    /// 同 [`add_task`](Self::add_task)，name 非空时代替从 URL 推导出的文件名
    pub async fn add_task_with_name(
        &self,
        url: &str,
        dir: &str,
        name: Option<&str>,
    ) -> Result<String, DownloadError> {
        if self.shutdown.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let parsed =
            Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidUrl(format!(
                "不支持的协议: {}",
                parsed.scheme()
            )));
        }

        let dir_path = self.resolve_dir(dir).await?;
        let filename = match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => sanitize_filename(name),
            None => filename_from_url(url),
        };
        let destination = reserve_destination(&dir_path, &filename).await?;

        let filename = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_path = destination
            .strip_prefix(&self.root)
            .unwrap_or(&destination)
            .to_string_lossy()
            .into_owned();

        let task_id = self.store.create(NewTask {
            url: url.to_string(),
            filename,
            file_path,
            destination: destination.clone(),
        })?;

        self.spawn_workers(&task_id, url, destination);
        info!("已添加下载任务: {} ({})", task_id, url);
        Ok(task_id)
    }

    // 词法检查 + canonicalize 后再检查一次，防止通过符号链接逃出根目录
    async fn resolve_dir(&self, dir: &str) -> Result<PathBuf, DownloadError> {
        let lexical = resolve_within_root(&self.root, dir)
            .ok_or_else(|| DownloadError::PathViolation(PathBuf::from(dir)))?;

        let real = match tokio::fs::canonicalize(&lexical).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DownloadError::DirectoryNotFound(PathBuf::from(dir)));
            }
            Err(e) => return Err(e.into()),
        };
        if !is_sub_path(&self.root, &real) {
            warn!("拒绝越界的目标目录: {}", dir);
            return Err(DownloadError::PathViolation(PathBuf::from(dir)));
        }
        if !tokio::fs::metadata(&real).await?.is_dir() {
            return Err(DownloadError::DirectoryNotFound(PathBuf::from(dir)));
        }
        Ok(real)
    }

    fn spawn_workers(&self, task_id: &str, url: &str, destination: PathBuf) {
        let counters = TransferCounters::new();
        let done = CancellationToken::new();

        let job = TransferJob {
            task_id: task_id.to_string(),
            url: url.to_string(),
            destination,
            counters: Arc::clone(&counters),
            cancel: self.shutdown.child_token(),
            done: done.clone(),
            timeout: self.task_timeout,
        };
        let sampler = ProgressSampler::new(
            task_id.to_string(),
            counters,
            Arc::clone(&self.store),
            self.sample_interval,
            done,
        );

        let executor = self.executor.clone();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            executor.run(store, job).await;
        });
        tokio::spawn(sampler.run());
    }

    // 获取任务状态
    pub fn get_task_status(&self, task_id: &str) -> Result<TaskInfo, DownloadError> {
        self.store
            .get(task_id)
            .ok_or_else(|| DownloadError::TaskNotFound(task_id.to_string()))
    }

    /// task_ids 为空时匹配全部任务；结果保持任务表的插入顺序
    pub fn list(&self, task_ids: &[String], status: Option<TaskState>) -> Vec<TaskInfo> {
        let condition = ListCondition {
            task_ids: task_ids.to_vec(),
            status,
        };
        self.store
            .snapshot()
            .into_iter()
            .filter(|task| condition.matches(task))
            .collect()
    }

    /// 多个条件取并集，每个任务只出现一次，按首次命中的顺序排列
    pub fn list_or(&self, conditions: &[ListCondition]) -> Vec<TaskInfo> {
        let snapshot = self.store.snapshot();
        let mut seen = HashSet::new();
        let mut result = Vec::new();

        for condition in conditions {
            for task in snapshot.iter().filter(|task| condition.matches(task)) {
                if seen.insert(task.task_id.as_str()) {
                    result.push(task.clone());
                }
            }
        }
        result
    }

    /// 删除结束时间早于 now - retention 的终态任务，返回删除数量
    pub fn clear_ended_tasks(&self, retention: Duration) -> usize {
        let cutoff = TimeDelta::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let removed = self.store.purge_ended(cutoff);
        if !removed.is_empty() {
            info!("已清理 {} 个过期任务", removed.len());
        }
        removed.len()
    }

    /// 启动定期清理，管理器关闭时退出。every 至少为 1ms
    pub fn spawn_retention_job(&self, every: Duration, retention: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        let every = every.max(MIN_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.clear_ended_tasks(retention);
                        debug!("定期清理完成，删除 {} 个任务", removed);
                    }
                }
            }
            debug!("定期清理任务已退出");
        })
    }

    /// 取消所有进行中的下载并停止后台任务
    pub fn shutdown(&self) {
        info!("正在关闭下载管理器");
        self.shutdown.cancel();
    }
}

// 用 create_new 预占目标文件，保证并发任务不会写同一个路径
async fn reserve_destination(dir: &Path, filename: &str) -> Result<PathBuf, DownloadError> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let candidate = dir.join(numbered_filename(filename, n));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(DownloadError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("无法为 {} 分配文件名", filename),
    )))
}
