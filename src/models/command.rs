use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Set when the command failed to launch, exited nonzero or timed out
    pub error: Option<String>,
    /// RFC 3339 completion time
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: String,
}
