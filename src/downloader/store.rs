use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::error::DownloadError;
use super::models::{DownloadStatus, NewTask, TaskInfo, TaskState};

/// update 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// 任务已处于终态，本次修改被丢弃
    Terminal,
    Missing,
}

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<String, TaskInfo>, // task_id -> Task
    order: Vec<String>,               // 插入顺序
}

/// 所有任务状态的唯一持有者。
///
/// 所有读写都经过同一把锁，临界区内只做纯内存操作，不做任何 IO。
/// 读操作返回的是副本，不会观察到修改到一半的记录。
#[derive(Default)]
pub struct TaskStore {
    inner: Mutex<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // mutator 只作用在副本上，锁中毒时表内数据仍然一致
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // 以新的 uuid 插入一个 Pending 任务
    pub fn create(&self, new_task: NewTask) -> Result<String, DownloadError> {
        let task_id = Uuid::new_v4().to_string();
        let task = TaskInfo {
            task_id: task_id.clone(),
            url: new_task.url,
            filename: new_task.filename,
            file_path: new_task.file_path,
            destination: new_task.destination,
            status: DownloadStatus::default(),
            started_at: Utc::now(),
            end_at: None,
        };

        {
            let mut inner = self.lock();
            if inner.tasks.contains_key(&task_id) {
                return Err(DownloadError::TaskAlreadyExists(task_id));
            }
            inner.tasks.insert(task_id.clone(), task);
            inner.order.push(task_id.clone());
        }
        // 日志输出放在锁外
        debug!("任务已创建: {}", task_id);
        Ok(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<TaskInfo> {
        self.lock().tasks.get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 对非终态任务应用修改。
    ///
    /// 终态是吸收态：任务一旦 Finished/Failed，之后的修改全部丢弃。
    /// 修改完成后还会校正几个不变量：
    /// - 已下载字节数不回退，且在总大小已知时不超过总大小
    /// - 进入终态时必然带上 end_at，非终态时 end_at 必然为空
    pub fn update<F>(&self, task_id: &str, mutator: F) -> UpdateOutcome
    where
        F: FnOnce(&mut TaskInfo),
    {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.get_mut(task_id) else {
            return UpdateOutcome::Missing;
        };
        if task.is_terminal() {
            return UpdateOutcome::Terminal;
        }

        let previous = task.status.downloaded;
        let mut draft = task.clone();
        mutator(&mut draft);

        // 不可变字段不允许被修改
        draft.task_id = task.task_id.clone();
        draft.url = task.url.clone();
        draft.destination = task.destination.clone();
        draft.started_at = task.started_at;

        let status = &mut draft.status;
        status.downloaded = status.downloaded.max(previous);
        if status.total_size > 0 && status.downloaded > status.total_size {
            status.downloaded = status.total_size;
        }
        if status.status.is_terminal() {
            draft.end_at.get_or_insert_with(Utc::now);
        } else {
            draft.end_at = None;
        }
        if draft.status.status != TaskState::Failed {
            draft.status.err_msg = None;
        }

        *task = draft;
        UpdateOutcome::Applied
    }

    /// 删除一个已结束的任务，非终态任务不会被删除
    pub fn delete(&self, task_id: &str) -> Option<TaskInfo> {
        let mut inner = self.lock();
        if !inner.tasks.get(task_id)?.is_terminal() {
            return None;
        }
        let removed = inner.tasks.remove(task_id);
        inner.order.retain(|id| id != task_id);
        removed
    }

    /// 在一次加锁内删除所有 end_at 不晚于 cutoff 的终态任务，返回被删除的任务 id
    pub fn purge_ended(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .order
            .iter()
            .filter(|id| {
                inner.tasks.get(*id).is_some_and(|task| {
                    task.is_terminal() && task.end_at.is_some_and(|end_at| end_at <= cutoff)
                })
            })
            .cloned()
            .collect();

        for id in &expired {
            inner.tasks.remove(id);
        }
        inner.order.retain(|id| !expired.contains(id));
        expired
    }

    /// 按插入顺序返回所有任务的副本
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn new_task(name: &str) -> NewTask {
        NewTask {
            url: format!("http://host/{}", name),
            filename: name.to_string(),
            file_path: name.to_string(),
            destination: PathBuf::from("/srv").join(name),
        }
    }

    #[test]
    fn test_create_starts_pending() {
        let store = TaskStore::new();
        let id = store.create(new_task("a.bin")).unwrap();
        let task = store.get(&id).unwrap();

        assert_eq!(task.state(), TaskState::Pending);
        assert!(task.end_at.is_none());
        assert!(task.status.err_msg.is_none());
        assert_eq!(task.filename, "a.bin");
    }

    #[test]
    fn test_terminal_state_is_absorbing() {
        let store = TaskStore::new();
        let id = store.create(new_task("a.bin")).unwrap();

        let outcome = store.update(&id, |task| {
            task.status.status = TaskState::Failed;
            task.status.err_msg = Some("boom".to_string());
        });
        assert_eq!(outcome, UpdateOutcome::Applied);
        let failed = store.get(&id).unwrap();
        assert!(failed.end_at.is_some());

        let outcome = store.update(&id, |task| {
            task.status.status = TaskState::Downloading;
            task.status.downloaded = 42;
        });
        assert_eq!(outcome, UpdateOutcome::Terminal);
        assert_eq!(store.get(&id).unwrap(), failed);
    }

    #[test]
    fn test_downloaded_never_decreases_or_exceeds_total() {
        let store = TaskStore::new();
        let id = store.create(new_task("a.bin")).unwrap();

        store.update(&id, |task| {
            task.status.downloaded = 50;
            task.status.total_size = 100;
        });
        store.update(&id, |task| task.status.downloaded = 10);
        assert_eq!(store.get(&id).unwrap().status.downloaded, 50);

        store.update(&id, |task| task.status.downloaded = 500);
        assert_eq!(store.get(&id).unwrap().status.downloaded, 100);
    }

    #[test]
    fn test_end_at_only_set_on_terminal() {
        let store = TaskStore::new();
        let id = store.create(new_task("a.bin")).unwrap();

        store.update(&id, |task| {
            task.status.status = TaskState::Downloading;
            task.end_at = Some(Utc::now());
            task.status.err_msg = Some("not yet".to_string());
        });
        let task = store.get(&id).unwrap();
        assert!(task.end_at.is_none());
        assert!(task.status.err_msg.is_none());

        store.update(&id, |task| task.status.status = TaskState::Finished);
        assert!(store.get(&id).unwrap().end_at.is_some());
    }

    #[test]
    fn test_update_missing_task() {
        let store = TaskStore::new();
        assert_eq!(store.update("nope", |_| {}), UpdateOutcome::Missing);
    }

    #[test]
    fn test_delete_only_terminal() {
        let store = TaskStore::new();
        let id = store.create(new_task("a.bin")).unwrap();
        assert!(store.delete(&id).is_none());
        assert_eq!(store.len(), 1);

        store.update(&id, |task| task.status.status = TaskState::Finished);
        assert!(store.delete(&id).is_some());
        assert!(store.is_empty());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let store = TaskStore::new();
        let ids: Vec<String> = (0..10)
            .map(|i| store.create(new_task(&format!("{}.bin", i))).unwrap())
            .collect();

        let snapshot_ids: Vec<String> = store.snapshot().into_iter().map(|t| t.task_id).collect();
        assert_eq!(snapshot_ids, ids);
    }

    #[test]
    fn test_purge_ended_skips_active_tasks() {
        let store = TaskStore::new();
        let active = store.create(new_task("active.bin")).unwrap();
        let done = store.create(new_task("done.bin")).unwrap();
        store.update(&done, |task| task.status.status = TaskState::Finished);

        let removed = store.purge_ended(Utc::now());
        assert_eq!(removed, vec![done.clone()]);
        assert!(store.get(&active).is_some());
        assert!(store.get(&done).is_none());
        assert!(store.purge_ended(Utc::now()).is_empty());
    }

    #[test]
    fn test_create_logs_outside_lock() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use tracing::{Event, Subscriber};
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

        // 每条日志事件发生时检查任务表的锁是否空闲
        struct LockWatcher {
            store: Arc<TaskStore>,
            events: Arc<AtomicUsize>,
            locked: Arc<AtomicUsize>,
        }

        impl<S: Subscriber> Layer<S> for LockWatcher {
            fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
                self.events.fetch_add(1, Ordering::SeqCst);
                if self.store.inner.try_lock().is_err() {
                    self.locked.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let store = Arc::new(TaskStore::new());
        let events = Arc::new(AtomicUsize::new(0));
        let locked = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(LockWatcher {
            store: Arc::clone(&store),
            events: Arc::clone(&events),
            locked: Arc::clone(&locked),
        });

        tracing::subscriber::with_default(subscriber, || {
            store.create(new_task("a.bin")).unwrap();
        });

        assert!(events.load(Ordering::SeqCst) >= 1);
        assert_eq!(locked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(TaskStore::new());
        let id = store.create(new_task("a.bin")).unwrap();

        let sampler = {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                for n in 1..=2000u64 {
                    store.update(&id, |task| {
                        task.status.status = TaskState::Downloading;
                        task.status.downloaded = n;
                        task.status.total_size = 2000;
                    });
                }
            })
        };
        let finisher = {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                thread::yield_now();
                store.update(&id, |task| task.status.status = TaskState::Finished);
            })
        };

        let mut last = 0;
        for _ in 0..2000 {
            let task = store.get(&id).unwrap();
            assert_eq!(task.end_at.is_some(), task.is_terminal());
            assert!(task.status.downloaded >= last);
            last = task.status.downloaded;
        }

        sampler.join().unwrap();
        finisher.join().unwrap();

        let task = store.get(&id).unwrap();
        assert_eq!(task.state(), TaskState::Finished);
        assert!(task.end_at.is_some());
    }
}
