use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::downloader::DownloadError;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<DownloadError> for HttpError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::PathViolation(_) | DownloadError::InvalidUrl(_) => {
                HttpError::BadRequest(err.to_string())
            }
            DownloadError::DirectoryNotFound(_) | DownloadError::TaskNotFound(_) => {
                HttpError::NotFound(err.to_string())
            }
            _ => HttpError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::BadRequest(format!("无效的请求体: {}", err))
    }
}
