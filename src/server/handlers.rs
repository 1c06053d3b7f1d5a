use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::AppState;
use super::error::HttpError;
use crate::common::models::{
    DOWNLOAD_METHOD, DownloadResponse, ListTaskRequest, ListTaskResponse, PostRequest,
    TASKS_ENDPOINT,
};

pub async fn post_root(State(state): State<AppState>, body: Bytes) -> Result<Response, HttpError> {
    dispatch(&state, "", &body).await
}

pub async fn post_path(
    State(state): State<AppState>,
    Path(uri): Path<String>,
    body: Bytes,
) -> Result<Response, HttpError> {
    dispatch(&state, &uri, &body).await
}

async fn dispatch(state: &AppState, uri: &str, body: &[u8]) -> Result<Response, HttpError> {
    if uri == TASKS_ENDPOINT {
        let req: ListTaskRequest = serde_json::from_slice(body)?;
        return Ok(list_tasks(state, req).into_response());
    }

    let req: PostRequest = serde_json::from_slice(body)?;
    match req.method.as_str() {
        DOWNLOAD_METHOD => Ok(add_download(state, uri, req).await?.into_response()),
        other => Err(HttpError::BadRequest(format!("不支持的操作: {}", other))),
    }
}

async fn add_download(
    state: &AppState,
    dir: &str,
    req: PostRequest,
) -> Result<Json<DownloadResponse>, HttpError> {
    let task_id = state
        .manager
        .add_task_with_name(&req.url, dir, Some(&req.name))
        .await?;
    let filename = state.manager.get_task_status(&task_id)?.filename;
    Ok(Json(DownloadResponse { task_id, filename }))
}

fn list_tasks(state: &AppState, req: ListTaskRequest) -> Json<ListTaskResponse> {
    let tasks = state.manager.list_or(&req.or);
    debug!(conditions = req.or.len(), matched = tasks.len(), "任务列表查询");
    Json(ListTaskResponse { tasks })
}
