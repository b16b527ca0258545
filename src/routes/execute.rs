//! POST /api/execute { command: string }
//!
//! Runs a shell command in the workspace root and returns its output. The
//! same result is broadcast as `command_output`. Command failures and
//! timeouts come back as a normal result with `error` set.
//!
//! The command runs on its own task: a client that disconnects early does
//! not cancel it, and the broadcast still goes out.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};

use crate::error::Result;
use crate::models::{CommandResult, ExecuteRequest};
use crate::runner;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/execute", post(execute_command))
        .with_state(state)
}

async fn execute_command(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<CommandResult>> {
    let Json(request) = payload?;
    let AppState {
        runner: shell,
        events,
        ..
    } = state;
    let task = tokio::spawn(async move {
        runner::execute(shell.as_ref(), &events, &request.command).await
    });
    let output = task.await??;
    Ok(Json(output))
}
