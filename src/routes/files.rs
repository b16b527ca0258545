//! Workspace file endpoints.
//!
//! - GET /api/files
//!   Full recursive snapshot, one entry per file with its text content.
//!   Used by: tree sidebar on first load
//!
//! - POST /api/files/save { path: string, content: string }
//!   Creates or overwrites a file; broadcasts `file_updated`.
//!   Used by: editor save
//!
//! - DELETE /api/files/{*path}
//!   Deletes a file, or everything under a folder path; broadcasts
//!   `file_deleted`. Deleting a missing path still succeeds.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
    routing::{delete, get, post},
};

use crate::error::{AppError, Result};
use crate::models::{FileEntry, SaveFileRequest, SuccessResponse};
use crate::state::AppState;

/// Editor saves are whole-file JSON bodies.
const MAX_SAVE_BODY: usize = 50 * 1024 * 1024;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/files", get(list_files))
        // The static save route shadows the wildcard for a root file named
        // `save`, so it answers DELETE for that file itself.
        .route(
            "/api/files/save",
            post(save_file)
                .delete(delete_root_save)
                .layer(DefaultBodyLimit::max(MAX_SAVE_BODY)),
        )
        .route("/api/files/{*path}", delete(delete_file))
        .with_state(state)
}

async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileEntry>>> {
    let workspace = state.workspace.clone();
    let files = tokio::task::spawn_blocking(move || workspace.list()).await??;
    Ok(Json(files))
}

async fn save_file(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SaveFileRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>> {
    let Json(request) = payload?;
    let path = request
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::InvalidRequest("No file path provided".to_string()))?;

    let workspace = state.workspace.clone();
    tokio::task::spawn_blocking(move || workspace.save(&path, &request.content)).await??;
    Ok(Json(SuccessResponse::ok()))
}

async fn delete_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<SuccessResponse>> {
    remove(state, path).await
}

async fn delete_root_save(State(state): State<AppState>) -> Result<Json<SuccessResponse>> {
    remove(state, "save".to_string()).await
}

async fn remove(state: AppState, path: String) -> Result<Json<SuccessResponse>> {
    let workspace = state.workspace.clone();
    tokio::task::spawn_blocking(move || workspace.delete(&path)).await??;
    Ok(Json(SuccessResponse::ok()))
}
