use serde::Serialize;

/// Workspace summary (status bar)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub root: String,
    pub file_count: usize,
    pub total_size: u64,
    pub subscribers: usize,
}
