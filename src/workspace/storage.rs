//! Storage accessor: the single source of truth for workspace files.
//!
//! `Storage` is the seam between the mutation service and the bytes on disk.
//! `DiskStorage` maps sanitized `WorkspacePath`s onto a root directory.
//! Writes are staged in a hidden sibling file and renamed into place so a
//! concurrent listing never reads a half-written file.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::{AppError, Result};
use crate::workspace::WorkspacePath;

/// Name prefix of in-flight write staging files; never listed.
const STAGING_PREFIX: &str = ".wsync-staging-";

/// Stat info for one stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: WorkspacePath,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub modified_ms: i64,
}

pub trait Storage: Send + Sync {
    fn root(&self) -> &Path;
    fn read(&self, path: &WorkspacePath) -> Result<Vec<u8>>;
    fn stat(&self, path: &WorkspacePath) -> Result<StoredFile>;
    /// Create or replace a file, creating parent directories as needed.
    fn write(&self, path: &WorkspacePath, data: &[u8]) -> Result<()>;
    /// Remove a file, or a directory with everything beneath it.
    /// Returns the number of files removed.
    fn remove(&self, path: &WorkspacePath) -> Result<usize>;
    /// Every file under the root, directories omitted.
    fn list_recursive(&self) -> Result<Vec<StoredFile>>;
}

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Open (creating if needed) a workspace rooted at `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(AppError::InvalidPath(format!("{} is not a directory", root.display())));
        }
        Ok(Self { root })
    }

    fn resolve(&self, path: &WorkspacePath) -> PathBuf {
        path.to_fs_path(&self.root)
    }

    /// Links are listed only when they end at a regular file inside the
    /// workspace; dangling links, links to folders and links leading out
    /// of the root stay hidden.
    fn links_to_file_inside(&self, link: &Path) -> bool {
        match fs::canonicalize(link) {
            Ok(target) => target.starts_with(&self.root) && target.is_file(),
            Err(_) => false,
        }
    }
}

fn not_found(path: &WorkspacePath, err: std::io::Error) -> AppError {
    if err.kind() == ErrorKind::NotFound {
        AppError::NotFound(path.to_string())
    } else {
        AppError::Io(err)
    }
}

fn to_millis(time: std::io::Result<SystemTime>) -> i64 {
    time.map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or_default()
}

impl Storage for DiskStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn read(&self, path: &WorkspacePath) -> Result<Vec<u8>> {
        fs::read(self.resolve(path)).map_err(|e| not_found(path, e))
    }

    fn stat(&self, path: &WorkspacePath) -> Result<StoredFile> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| not_found(path, e))?;
        if meta.is_dir() {
            return Err(AppError::InvalidPath(format!("{} is a directory", path)));
        }
        Ok(StoredFile {
            path: path.clone(),
            size: meta.len(),
            modified_ms: to_millis(meta.modified()),
        })
    }

    fn write(&self, path: &WorkspacePath, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        let parent = full
            .parent()
            .ok_or_else(|| AppError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(parent)?;

        let existing = match fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => {
                return Err(AppError::InvalidPath(format!("{} is a directory", path)));
            }
            Ok(meta) => Some(meta.permissions()),
            Err(_) => None,
        };

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(parent)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;

        // Staging files are created owner-only; keep the mode of the file we
        // replace, or fall back to a regular 0644 file.
        match existing {
            Some(perms) => staged.as_file().set_permissions(perms)?,
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    staged
                        .as_file()
                        .set_permissions(fs::Permissions::from_mode(0o644))?;
                }
            }
        }

        staged.persist(&full).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, path: &WorkspacePath) -> Result<usize> {
        let full = self.resolve(path);
        let meta = fs::symlink_metadata(&full).map_err(|e| not_found(path, e))?;

        if meta.is_dir() {
            let count = WalkDir::new(&full)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| !e.file_type().is_dir())
                .count();
            fs::remove_dir_all(&full)?;
            Ok(count)
        } else {
            fs::remove_file(&full)?;
            Ok(1)
        }
    }

    fn list_recursive(&self) -> Result<Vec<StoredFile>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Skipping unreadable workspace entry: {}", e);
                    continue;
                }
            };

            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }
            if entry.file_type().is_symlink() {
                if !self.links_to_file_inside(entry.path()) {
                    tracing::debug!("Skipping link {}", entry.path().display());
                    continue;
                }
            } else if !entry.file_type().is_file() {
                continue;
            }

            let Some(path) = WorkspacePath::from_fs_path(&self.root, entry.path()) else {
                tracing::warn!("Skipping unaddressable file: {}", entry.path().display());
                continue;
            };

            // Follows links, so a listed link reports its target's size
            match fs::metadata(entry.path()) {
                Ok(meta) => files.push(StoredFile {
                    path,
                    size: meta.len(),
                    modified_ms: to_millis(meta.modified()),
                }),
                Err(e) => tracing::warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn p(raw: &str) -> WorkspacePath {
        WorkspacePath::parse(raw).unwrap()
    }

    fn storage() -> (TempDir, DiskStorage) {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_write_creates_parents_and_reads_back() {
        let (_dir, storage) = storage();
        storage.write(&p("a/b/c.txt"), b"deep").unwrap();
        assert_eq!(storage.read(&p("a/b/c.txt")).unwrap(), b"deep");

        storage.write(&p("a/b/c.txt"), b"replaced").unwrap();
        let stat = storage.stat(&p("a/b/c.txt")).unwrap();
        assert_eq!(stat.size, 8);
        assert!(stat.modified_ms > 0);
    }

    #[test]
    fn test_missing_paths_report_not_found() {
        let (_dir, storage) = storage();
        assert!(matches!(storage.read(&p("nope.txt")), Err(AppError::NotFound(_))));
        assert!(matches!(storage.remove(&p("nope.txt")), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_write_over_directory_is_rejected() {
        let (_dir, storage) = storage();
        storage.write(&p("dir/inner.txt"), b"x").unwrap();
        assert!(matches!(storage.write(&p("dir"), b"x"), Err(AppError::InvalidPath(_))));
    }

    #[test]
    fn test_remove_directory_counts_files() {
        let (dir, storage) = storage();
        storage.write(&p("a/b.txt"), b"1").unwrap();
        storage.write(&p("a/sub/c.txt"), b"2").unwrap();
        storage.write(&p("ab.txt"), b"3").unwrap();

        assert_eq!(storage.remove(&p("a")).unwrap(), 2);
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("ab.txt").exists());
    }

    #[test]
    fn test_list_recursive_skips_directories_and_staging_files() {
        let (dir, storage) = storage();
        storage.write(&p("top.txt"), b"t").unwrap();
        storage.write(&p("nested/inner.txt"), b"in").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join(format!("{}leftover", STAGING_PREFIX)), b"x").unwrap();

        let paths: Vec<String> = storage
            .list_recursive()
            .unwrap()
            .into_iter()
            .map(|f| f.path.to_string())
            .collect();
        assert_eq!(paths, vec!["nested/inner.txt", "top.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_links_listed_only_when_they_stay_inside() {
        use std::os::unix::fs::symlink;

        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"s").unwrap();

        let (dir, storage) = storage();
        storage.write(&p("real.txt"), b"real").unwrap();
        symlink(dir.path().join("real.txt"), dir.path().join("alias.txt")).unwrap();
        symlink(outside.path().join("secret.txt"), dir.path().join("escape.txt")).unwrap();
        symlink(dir.path().join("missing.txt"), dir.path().join("dangling.txt")).unwrap();

        let files = storage.list_recursive().unwrap();
        let paths: Vec<String> = files.iter().map(|f| f.path.to_string()).collect();
        assert_eq!(paths, vec!["alias.txt", "real.txt"]);
        assert_eq!(files[0].size, 4);
        assert_eq!(storage.read(&p("alias.txt")).unwrap(), b"real");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, storage) = storage();
        storage.write(&p("run.sh"), b"#!/bin/sh\n").unwrap();
        let full = dir.path().join("run.sh");
        assert_eq!(fs::metadata(&full).unwrap().permissions().mode() & 0o777, 0o644);

        fs::set_permissions(&full, fs::Permissions::from_mode(0o755)).unwrap();
        storage.write(&p("run.sh"), b"#!/bin/sh\necho hi\n").unwrap();
        assert_eq!(fs::metadata(&full).unwrap().permissions().mode() & 0o777, 0o755);
    }
}
