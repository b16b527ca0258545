//! Application error types and HTTP response mapping.
//!
//! Defines `AppError` for every per-request failure and implements Axum's
//! `IntoResponse` so handlers can return `Result<T>` directly. Every error
//! body has the shape `{ "success": false, "error": "<message>" }`.
//!
//! Error mappings:
//! - `NotFound` → 404
//! - `PathTraversal`, `InvalidPath`, `InvalidRequest` → 400
//! - `PayloadTooLarge`, `UploadTooLarge` → 413
//! - `Archive` → 422
//! - `Io`, `PartialUpload`, `Internal` → 500

use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path escapes the workspace: {0}")]
    PathTraversal(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{name} exceeds the {limit_mib} MiB upload limit")]
    PayloadTooLarge { name: String, limit_mib: u64 },

    #[error("Upload exceeds the {limit_mib} MiB total limit once expanded")]
    UploadTooLarge { limit_mib: u64 },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Some files of an upload were written before a write failed. The
    /// written ones stay and have been broadcast.
    #[error("Upload stopped after writing {}: {reason}", .committed.join(", "))]
    PartialUpload {
        committed: Vec<String>,
        reason: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PathTraversal(_) | AppError::InvalidPath(_) | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge { .. } | AppError::UploadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::Archive(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Io(_) | AppError::PartialUpload { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::InvalidRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Worker task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
