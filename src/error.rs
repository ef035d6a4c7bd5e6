//! Error taxonomy and HTTP status mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("command timed out after {0}s")]
    Timeout(u64),

    #[error("failed to spawn process: {0}")]
    Spawn(std::io::Error),

    #[error("unsupported language: {0}")]
    InvalidLanguage(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("recording already in progress (pid {0})")]
    AlreadyRecording(u32),

    #[error("no recording in progress")]
    NotRecording,

    #[error("result is not JSON-serializable: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::InvalidLanguage(_) | ApiError::InvalidArgument(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::AlreadyRecording(_) | ApiError::NotRecording => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Spawn(_)
            | ApiError::SessionLost(_)
            | ApiError::Serialization(_)
            | ApiError::Browser(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
