//! File entry DTOs.
//!
//! - `FileEntry`: One tracked file, flat listing item (tree sidebar + editor)
//! - `UploadResponse`: Result of POST /api/upload
//! - `SaveFileRequest`: Request body for POST /api/files/save
//! - `SuccessResponse`: Bare `{ success: true }` acknowledgement

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
}

/// Directories are implicit in paths, so only files are ever listed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveFileRequest {
    pub path: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
