//! Push-channel messages.
//!
//! Serialized as internally tagged JSON, e.g.
//! `{"type":"file_deleted","path":"notes/todo.md"}`.

use serde::{Deserialize, Serialize};

use super::{CommandResult, FileEntry};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    FilesUploaded { files: Vec<FileEntry> },
    FileUpdated { path: String, content: String },
    FileDeleted { path: String },
    CommandOutput { output: CommandResult },
}

impl BroadcastEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastEvent::FilesUploaded { .. } => "files_uploaded",
            BroadcastEvent::FileUpdated { .. } => "file_updated",
            BroadcastEvent::FileDeleted { .. } => "file_deleted",
            BroadcastEvent::CommandOutput { .. } => "command_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_tagged() {
        let event = BroadcastEvent::FileUpdated {
            path: "f.txt".to_string(),
            content: "v".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "file_updated", "path": "f.txt", "content": "v" })
        );
        assert_eq!(event.kind(), "file_updated");
    }

    #[test]
    fn test_command_output_nests_result() {
        let event = BroadcastEvent::CommandOutput {
            output: CommandResult {
                command: "ls".to_string(),
                stdout: "a.txt\n".to_string(),
                stderr: String::new(),
                error: None,
                timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "command_output");
        assert_eq!(value["output"]["stdout"], "a.txt\n");
        assert!(value["output"]["error"].is_null());
    }

    #[test]
    fn test_file_entry_uses_client_field_names() {
        let event = BroadcastEvent::FilesUploaded {
            files: vec![FileEntry {
                name: "b.txt".to_string(),
                path: "a/b.txt".to_string(),
                entry_type: crate::models::EntryType::File,
                size: 2,
                content: "hi".to_string(),
                last_modified: 1_700_000_000_000,
            }],
        };
        let value = serde_json::to_value(&event).unwrap();
        let file = &value["files"][0];
        assert_eq!(file["type"], "file");
        assert_eq!(file["lastModified"], 1_700_000_000_000i64);
        assert!(file.get("entry_type").is_none());
    }
}
