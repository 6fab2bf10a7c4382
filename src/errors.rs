use crate::services::blob_service::BrowserError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<BrowserError> for AppError {
    fn from(err: BrowserError) -> Self {
        let status = match &err {
            BrowserError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            BrowserError::NotFound(_) => StatusCode::NOT_FOUND,
            BrowserError::AlreadyExists(_) => StatusCode::CONFLICT,
            BrowserError::UnsupportedExtension(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            BrowserError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            BrowserError::StoreAuth(_) => StatusCode::BAD_GATEWAY,
            BrowserError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BrowserError::FolderDeleteIncomplete { .. } | BrowserError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{err}");
        } else {
            tracing::warn!(status = status.as_u16(), "{err}");
        }

        AppError::new(status, err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}
