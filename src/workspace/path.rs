//! Sanitized workspace-relative paths.
//!
//! Every path that reaches storage comes from an upload filename, an archive
//! entry name or a request body, so all of them go through `WorkspacePath`.
//! Backslashes become slashes, empty and `.` segments are dropped, leading
//! slashes are stripped, and any `..` segment is rejected outright.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspacePath(String);

impl WorkspacePath {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('\0') {
            return Err(AppError::InvalidPath(raw.replace('\0', "\\0")));
        }

        let normalized = raw.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in normalized.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    tracing::warn!("Rejected path traversal attempt: {}", raw);
                    return Err(AppError::PathTraversal(raw.to_string()));
                }
                s => segments.push(s),
            }
        }

        if segments.is_empty() {
            return Err(AppError::InvalidPath(format!("'{}' does not name a file", raw)));
        }

        Ok(Self(segments.join("/")))
    }

    /// Nest this path under `prefix`. An empty prefix leaves it unchanged.
    pub fn under(&self, prefix: Option<&WorkspacePath>) -> WorkspacePath {
        match prefix {
            Some(p) => WorkspacePath(format!("{}/{}", p.0, self.0)),
            None => self.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Containing directory, `None` at the workspace root
    pub fn parent(&self) -> Option<WorkspacePath> {
        self.0
            .rsplit_once('/')
            .map(|(dir, _)| WorkspacePath(dir.to_string()))
    }

    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut full = root.to_path_buf();
        full.extend(self.0.split('/'));
        full
    }

    /// Inverse of `to_fs_path` for paths found while walking `root`.
    pub fn from_fs_path(root: &Path, full: &Path) -> Option<Self> {
        let relative = full.strip_prefix(root).ok()?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self::parse(&joined).ok()
    }
}

impl fmt::Display for WorkspacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
