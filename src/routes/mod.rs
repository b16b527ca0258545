//! API route handlers - maps HTTP endpoints onto the workspace core.
//!
//! Each submodule defines routes for a feature area:
//! - `files`: Listing, saving and deleting workspace files
//! - `upload`: Multipart upload with archive expansion
//! - `execute`: Shell commands in the workspace root
//! - `workspace`: Workspace summary
//! - `ws`: WebSocket push channel for live updates

pub mod execute;
pub mod files;
pub mod upload;
pub mod workspace;
pub mod ws;

use axum::Router;
use axum::http::Uri;

use crate::error::AppError;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(files::routes(state.clone()))
        .merge(upload::routes(state.clone()))
        .merge(execute::routes(state.clone()))
        .merge(workspace::routes(state.clone()))
        .merge(ws::routes(state))
        .fallback(not_found)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
