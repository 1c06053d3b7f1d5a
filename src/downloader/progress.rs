use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::core::TransferCounters;
use super::manager::MIN_INTERVAL;
use super::models::TaskState;
use super::store::{TaskStore, UpdateOutcome};

/// 周期性读取传输计数并把进度写回任务表。
///
/// 采样器从不决定任务何时结束：它在收到 done 信号，
/// 或者写入时发现任务已是终态后退出。
pub struct ProgressSampler {
    task_id: String,
    counters: Arc<TransferCounters>,
    store: Arc<TaskStore>,
    interval: Duration,
    done: CancellationToken,
}

impl ProgressSampler {
    pub fn new(
        task_id: String,
        counters: Arc<TransferCounters>,
        store: Arc<TaskStore>,
        interval: Duration,
        done: CancellationToken,
    ) -> Self {
        Self {
            task_id,
            counters,
            store,
            interval: interval.max(MIN_INTERVAL),
            done,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;

        let mut last_bytes = self.counters.downloaded();
        let mut last_at = Instant::now();

        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            let downloaded = self.counters.downloaded();
            let total = self.counters.total();
            let rate = bytes_per_second(downloaded.saturating_sub(last_bytes), now - last_at);
            last_bytes = downloaded;
            last_at = now;

            let outcome = self.store.update(&self.task_id, |task| {
                if downloaded > task.status.downloaded && task.state() == TaskState::Pending {
                    task.status.status = TaskState::Downloading;
                }
                task.status.downloaded = downloaded;
                task.status.total_size = total;
                task.status.speed = format_speed(rate);
            });

            if outcome != UpdateOutcome::Applied {
                debug!("任务 {} 已结束，停止采样 ({:?})", self.task_id, outcome);
                break;
            }
        }
    }
}

fn bytes_per_second(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (bytes as f64 / secs) as u64
}

pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_size(bytes_per_second))
}

/// 1023 -> "1023B", 1024 -> "1.0KB", 1048576 -> "1.0MB"
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size < KB {
        format!("{}B", size)
    } else if size < MB {
        format!("{:.1}KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.1}MB", size as f64 / MB as f64)
    } else {
        format!("{:.1}GB", size as f64 / GB as f64)
    }
}
