use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::events::EventHub;
use crate::runner::{SharedRunner, ShellRunner};
use crate::workspace::{DiskStorage, SharedWorkspace, WorkspaceService};

/// Everything the route handlers share. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub workspace: SharedWorkspace,
    pub runner: SharedRunner,
    pub events: EventHub,
    pub max_file_bytes: u64,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let storage = DiskStorage::open(&config.workspace)?;
        let events = EventHub::new();
        let workspace = Arc::new(WorkspaceService::new(
            storage,
            events.clone(),
            config.max_file_bytes,
            config.max_upload_bytes,
        ));
        let runner: SharedRunner = Arc::new(ShellRunner::new(
            workspace.root(),
            config.command_timeout,
        ));

        Ok(Self {
            workspace,
            runner,
            events,
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Swap in a different command runner.
    #[cfg(test)]
    pub fn with_runner(mut self, runner: SharedRunner) -> Self {
        self.runner = runner;
        self
    }
}
