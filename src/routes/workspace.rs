use axum::{Json, Router, extract::State, routing::get};

use crate::error::Result;
use crate::models::WorkspaceInfo;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/workspace", get(get_workspace_info))
        .with_state(state)
}

async fn get_workspace_info(State(state): State<AppState>) -> Result<Json<WorkspaceInfo>> {
    let workspace = state.workspace.clone();
    let info = tokio::task::spawn_blocking(move || workspace.info()).await??;
    Ok(Json(info))
}
