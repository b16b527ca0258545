//! POST /api/upload (multipart, repeated field `files`)
//!
//! Plain files land under their given name, folder uploads keep their
//! relative paths, `.zip` archives are expanded in place of the archive.
//! Each file is capped at the configured size while it streams in.
//! Broadcasts `files_uploaded` with the resulting entries.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
};

use crate::error::{AppError, Result};
use crate::models::UploadResponse;
use crate::state::AppState;
use crate::workspace::UploadedFile;

const UPLOAD_FIELD: &str = "files";

/// Ceiling for a whole multipart request
const MAX_UPLOAD_REQUEST: usize = 1024 * 1024 * 1024;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/upload",
            post(upload_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_REQUEST)),
        )
        .with_state(state)
}

async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let limit = state.max_file_bytes;
    let mut files = Vec::new();

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let Some(name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if (data.len() + chunk.len()) as u64 > limit {
                return Err(AppError::PayloadTooLarge {
                    name,
                    limit_mib: limit / (1024 * 1024),
                });
            }
            data.extend_from_slice(&chunk);
        }

        tracing::debug!("Received {} ({} bytes)", name, data.len());
        files.push(UploadedFile { name, data });
    }

    let workspace = state.workspace.clone();
    let entries = tokio::task::spawn_blocking(move || workspace.upload(files)).await??;
    Ok(Json(UploadResponse {
        success: true,
        files: entries,
    }))
}
