#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::header::CONTENT_LENGTH;
use axum::response::Response;
use axum::routing::get;
use fileserver::{DownloadManager, ManagerConfig, TaskInfo};
use futures::StreamExt;
use tokio::net::TcpListener;

pub const CHUNK_SIZE: usize = 1024;
pub const CHUNK_COUNT: usize = 10;

pub fn test_manager(root: &Path) -> DownloadManager {
    DownloadManager::new(ManagerConfig {
        root_dir: root.to_path_buf(),
        sample_interval: Duration::from_millis(50),
        ..ManagerConfig::default()
    })
    .unwrap()
}

pub fn test_manager_with_timeout(root: &Path, timeout: Duration) -> DownloadManager {
    DownloadManager::new(ManagerConfig {
        root_dir: root.to_path_buf(),
        sample_interval: Duration::from_millis(50),
        task_timeout: Some(timeout),
        ..ManagerConfig::default()
    })
    .unwrap()
}

/// 轮询直到任务满足条件，每次观察到的快照都交给 observe
pub async fn wait_until<P, O>(
    manager: &DownloadManager,
    task_id: &str,
    mut predicate: P,
    mut observe: O,
) -> TaskInfo
where
    P: FnMut(&TaskInfo) -> bool,
    O: FnMut(&TaskInfo),
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let task = manager.get_task_status(task_id).unwrap();
            observe(&task);
            if predicate(&task) {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("等待任务状态超时")
}

pub async fn wait_terminal(manager: &DownloadManager, task_id: &str) -> TaskInfo {
    wait_until(manager, task_id, |task| task.is_terminal(), |_| {}).await
}

/// 启动一个本地 HTTP 服务，/slow 每隔 chunk_delay 发送一个 1KB 的分块
pub async fn spawn_slow_server(chunk_delay: Duration) -> SocketAddr {
    let app = Router::new().route(
        "/slow",
        get(move || async move {
            let stream = futures::stream::iter(0..CHUNK_COUNT).then(move |_| async move {
                tokio::time::sleep(chunk_delay).await;
                Ok::<_, std::io::Error>(Bytes::from(vec![7u8; CHUNK_SIZE]))
            });
            Response::builder()
                .header(CONTENT_LENGTH, CHUNK_SIZE * CHUNK_COUNT)
                .body(Body::from_stream(stream))
                .unwrap()
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// 一个一定无法连接的地址
pub fn unreachable_url() -> String {
    "http://127.0.0.1:1/unreachable.bin".to_string()
}
