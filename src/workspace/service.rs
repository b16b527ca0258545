//! Mutation service: the façade every workspace change goes through.
//!
//! Each mutation stages and validates its input first, then performs its
//! storage writes and the matching broadcast under one global lock. The lock
//! serializes writes touching the same path and makes every subscriber see
//! events in the order mutations were applied. Listings do not take it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AppError, Result};
use crate::events::EventHub;
use crate::models::{BroadcastEvent, FileEntry, WorkspaceInfo};
use crate::workspace::archive::{ArchiveExpander, StagedFile, StagedFiles, is_archive_name};
use crate::workspace::{Storage, WorkspacePath, tree};

/// One file received from an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

pub struct WorkspaceService {
    storage: Box<dyn Storage>,
    expander: ArchiveExpander,
    max_upload_bytes: u64,
    events: EventHub,
    write_lock: Mutex<()>,
}

pub type SharedWorkspace = Arc<WorkspaceService>;

impl WorkspaceService {
    /// `max_file_bytes` caps each file (and each archive entry),
    /// `max_upload_bytes` everything one upload stages.
    pub fn new<S: Storage + 'static>(
        storage: S,
        events: EventHub,
        max_file_bytes: u64,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            storage: Box::new(storage),
            expander: ArchiveExpander::new(max_file_bytes),
            max_upload_bytes,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AppError::Internal("Lock poisoned".to_string()))
    }

    /// Full snapshot of the workspace.
    pub fn list(&self) -> Result<Vec<FileEntry>> {
        Ok(tree::walk(self.storage.as_ref())?.collect())
    }

    pub fn info(&self) -> Result<WorkspaceInfo> {
        let files = self.storage.list_recursive()?;
        Ok(WorkspaceInfo {
            root: self.root().to_string_lossy().to_string(),
            file_count: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
            subscribers: self.events.subscriber_count(),
        })
    }

    /// Write every uploaded file, expanding `.zip` archives into their
    /// entries. Nothing is written unless every input stages cleanly. If a
    /// write fails midway, the files already written are still broadcast
    /// and reported in `AppError::PartialUpload`.
    pub fn upload(&self, files: Vec<UploadedFile>) -> Result<Vec<FileEntry>> {
        if files.is_empty() {
            return Err(AppError::InvalidRequest("No files provided".to_string()));
        }

        let mut staged = StagedFiles::with_limit(self.max_upload_bytes);
        for file in files {
            let path = WorkspacePath::parse(&file.name)?;
            if is_archive_name(&file.name) {
                // Archives expand beside where they would have landed
                let prefix = path.parent();
                self.expander
                    .expand(&file.name, &file.data, prefix.as_ref(), &mut staged)?;
            } else {
                staged.push(StagedFile {
                    path,
                    data: file.data,
                })?;
            }
        }

        if let Some((file, nested)) = staged.find_conflict() {
            return Err(AppError::InvalidRequest(format!(
                "{} is uploaded as a file but {} needs it to be a folder",
                file, nested
            )));
        }
        if staged.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock()?;
        let mut committed = Vec::new();
        let mut failure = None;
        for file in staged.into_vec() {
            match self.storage.write(&file.path, &file.data) {
                Ok(()) => committed.push(file.path),
                Err(e) => {
                    failure = Some((file.path, e));
                    break;
                }
            }
        }

        let entries: Vec<FileEntry> = committed
            .iter()
            .filter_map(|path| match tree::entry_for(self.storage.as_ref(), path) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Wrote {} but cannot stat it: {}", path, e);
                    None
                }
            })
            .collect();
        if !entries.is_empty() {
            self.events.publish(BroadcastEvent::FilesUploaded {
                files: entries.clone(),
            });
        }

        match failure {
            None => {
                tracing::info!("Uploaded {} file(s)", entries.len());
                Ok(entries)
            }
            Some((path, e)) if committed.is_empty() => {
                tracing::warn!("Upload failed at {}: {}", path, e);
                Err(e)
            }
            Some((path, e)) => {
                tracing::error!(
                    "Upload failed at {} after writing {} file(s): {}",
                    path,
                    committed.len(),
                    e
                );
                Err(AppError::PartialUpload {
                    committed: committed.iter().map(|p| p.to_string()).collect(),
                    reason: format!("{}: {}", path, e),
                })
            }
        }
    }

    /// Create or overwrite a file. Last write wins.
    pub fn save(&self, raw_path: &str, content: &str) -> Result<WorkspacePath> {
        let path = WorkspacePath::parse(raw_path)?;

        let _guard = self.lock()?;
        self.storage.write(&path, content.as_bytes())?;

        tracing::info!("Saved {} ({} bytes)", path, content.len());
        self.events.publish(BroadcastEvent::FileUpdated {
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(path)
    }

    /// Remove a file, or every file beneath a directory-like prefix.
    /// Missing paths succeed without broadcasting. Returns files removed.
    pub fn delete(&self, raw_path: &str) -> Result<usize> {
        let path = WorkspacePath::parse(raw_path)?;

        let _guard = self.lock()?;
        let removed = match self.storage.remove(&path) {
            Ok(n) => n,
            Err(AppError::NotFound(_)) => {
                tracing::debug!("Delete of missing path {} ignored", path);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        tracing::info!("Deleted {} ({} file(s))", path, removed);
        self.events.publish(BroadcastEvent::FileDeleted {
            path: path.to_string(),
        });
        Ok(removed)
    }
}
