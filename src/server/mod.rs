//! 下载任务的 HTTP 接口
//!
//! - `POST /<dir>` `{"method":"download","url":...}` 添加下载任务
//! - `POST /:tasks` `{"or":[{"taskIds":[...],"status":"..."}]}` 查询任务

use std::net::SocketAddr;

use axum::Router;
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::downloader::DownloadManager;

pub mod error;
pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub manager: DownloadManager,
}

pub fn router(manager: DownloadManager) -> Router {
    Router::new()
        .route("/", post(handlers::post_root))
        .route("/{*uri}", post(handlers::post_path))
        .with_state(AppState { manager })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve<F>(manager: DownloadManager, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP 服务已启动: http://{}", listener.local_addr()?);

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
