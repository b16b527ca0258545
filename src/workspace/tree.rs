use crate::error::Result;
use crate::models::{EntryType, FileEntry};
use crate::workspace::storage::{Storage, StoredFile};
use crate::workspace::WorkspacePath;

/// Text payload for the editor; binary or unreadable files show as empty.
fn decode_content(storage: &dyn Storage, path: &WorkspacePath) -> String {
    match storage.read(path) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Could not read {}: {}", path, e);
            String::new()
        }
    }
}

pub fn to_entry(storage: &dyn Storage, file: StoredFile) -> FileEntry {
    let content = decode_content(storage, &file.path);
    FileEntry {
        name: file.path.name().to_string(),
        path: file.path.to_string(),
        entry_type: EntryType::File,
        size: file.size,
        content,
        last_modified: file.modified_ms,
    }
}

/// Fresh entry for a single path, straight from storage.
pub fn entry_for(storage: &dyn Storage, path: &WorkspacePath) -> Result<FileEntry> {
    let stat = storage.stat(path)?;
    Ok(to_entry(storage, stat))
}

/// Walk the whole workspace. Stat info is gathered up front; file contents
/// are read as the iterator is consumed. Each call re-walks storage.
pub fn walk(storage: &dyn Storage) -> Result<impl Iterator<Item = FileEntry> + '_> {
    let files = storage.list_recursive()?;
    Ok(files.into_iter().map(move |file| to_entry(storage, file)))
}
