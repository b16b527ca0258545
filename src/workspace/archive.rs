//! ZIP archive expansion.
//!
//! An archive is decoded completely in memory before anything touches
//! storage: a corrupt archive, an oversized entry or an entry name that
//! escapes the workspace fails the whole upload with nothing written.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::{AppError, Result};
use crate::workspace::WorkspacePath;

/// One decoded file waiting to be committed to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: WorkspacePath,
    pub data: Vec<u8>,
}

/// Ordered set of staged files; a later file with the same path replaces
/// the earlier one in place. The combined size of everything staged is
/// capped, so an archive of many small-compressing entries cannot grow
/// without bound.
#[derive(Debug)]
pub struct StagedFiles {
    files: Vec<StagedFile>,
    index: HashMap<WorkspacePath, usize>,
    total_bytes: u64,
    max_total_bytes: u64,
}

impl Default for StagedFiles {
    fn default() -> Self {
        Self::with_limit(u64::MAX)
    }
}

impl StagedFiles {
    pub fn with_limit(max_total_bytes: u64) -> Self {
        Self {
            files: Vec::new(),
            index: HashMap::new(),
            total_bytes: 0,
            max_total_bytes,
        }
    }

    /// Stage `file`. Fails without staging it if the total would pass the
    /// limit.
    pub fn push(&mut self, file: StagedFile) -> Result<()> {
        let slot = self.index.get(&file.path).copied();
        let replaced = slot.map_or(0, |i| self.files[i].data.len() as u64);
        let total = self.total_bytes - replaced + file.data.len() as u64;
        if total > self.max_total_bytes {
            return Err(AppError::UploadTooLarge {
                limit_mib: self.max_total_bytes / (1024 * 1024),
            });
        }
        self.total_bytes = total;

        match slot {
            Some(i) => self.files[i] = file,
            None => {
                self.index.insert(file.path.clone(), self.files.len());
                self.files.push(file);
            }
        }
        Ok(())
    }

    /// A staged file whose path is also a folder of another staged file,
    /// paired with that nested file.
    pub fn find_conflict(&self) -> Option<(&WorkspacePath, &WorkspacePath)> {
        for file in &self.files {
            let mut dir = file.path.parent();
            while let Some(d) = dir {
                if let Some(&i) = self.index.get(&d) {
                    return Some((&self.files[i].path, &file.path));
                }
                dir = d.parent();
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_vec(self) -> Vec<StagedFile> {
        self.files
    }
}

pub fn is_archive_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".zip")
}

pub struct ArchiveExpander {
    max_entry_bytes: u64,
}

impl ArchiveExpander {
    pub fn new(max_entry_bytes: u64) -> Self {
        Self { max_entry_bytes }
    }

    /// Decode every file entry of `archive` into `staged`, nested under
    /// `prefix`. Directory entries are skipped; their files carry the path.
    pub fn expand(
        &self,
        archive_name: &str,
        archive: &[u8],
        prefix: Option<&WorkspacePath>,
        staged: &mut StagedFiles,
    ) -> Result<usize> {
        let mut zip = ZipArchive::new(Cursor::new(archive))
            .map_err(|e| AppError::Archive(format!("{}: {}", archive_name, e)))?;

        let mut count = 0;
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| AppError::Archive(format!("{}: {}", archive_name, e)))?;
            if entry.is_dir() {
                continue;
            }

            let entry_name = entry.name().to_string();
            let path = WorkspacePath::parse(&entry_name)?.under(prefix);

            let mut data = Vec::with_capacity(entry.size().min(self.max_entry_bytes) as usize);
            entry
                .take(self.max_entry_bytes + 1)
                .read_to_end(&mut data)
                .map_err(|e| {
                    AppError::Archive(format!("{}: cannot read {}: {}", archive_name, entry_name, e))
                })?;

            if data.len() as u64 > self.max_entry_bytes {
                return Err(AppError::Archive(format!(
                    "{}: entry {} exceeds {} bytes when decompressed",
                    archive_name, entry_name, self.max_entry_bytes
                )));
            }

            staged.push(StagedFile { path, data })?;
            count += 1;
        }

        tracing::debug!("Staged {} entries from {}", count, archive_name);
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Build an in-memory archive; names ending in `/` become directories.
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    fn expand(bytes: &[u8], prefix: Option<&WorkspacePath>) -> Result<Vec<StagedFile>> {
        let mut staged = StagedFiles::default();
        ArchiveExpander::new(1024).expand("test.zip", bytes, prefix, &mut staged)?;
        Ok(staged.into_vec())
    }

    #[test]
    fn test_expands_files_and_skips_directories() {
        let bytes = build_zip(&[("x.txt", b"hi"), ("sub/", b""), ("sub/y.txt", b"yo")]);
        let files = expand(&bytes, None).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["x.txt", "sub/y.txt"]);
        assert_eq!(files[1].data, b"yo");
    }

    #[test]
    fn test_binary_entries_are_kept() {
        let bytes = build_zip(&[("logo.bin", &[0xff, 0xfe, 0x00, 0x81])]);
        let files = expand(&bytes, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].data, vec![0xff, 0xfe, 0x00, 0x81]);
    }

    #[test]
    fn test_prefix_is_applied() {
        let prefix = WorkspacePath::parse("vendor").unwrap();
        let bytes = build_zip(&[("lib/a.rs", b"fn a() {}")]);
        let files = expand(&bytes, Some(&prefix)).unwrap();
        assert_eq!(files[0].path.as_str(), "vendor/lib/a.rs");
    }

    #[test]
    fn test_corrupt_archive_fails() {
        let err = expand(b"PK\x03\x04 definitely not a zip", None).unwrap_err();
        assert!(matches!(err, AppError::Archive(_)), "got {:?}", err);
    }

    #[test]
    fn test_traversal_entry_fails_whole_archive() {
        let bytes = build_zip(&[("ok.txt", b"fine"), ("../../etc/passwd", b"evil")]);
        let err = expand(&bytes, None).unwrap_err();
        assert!(matches!(err, AppError::PathTraversal(_)), "got {:?}", err);
    }

    #[test]
    fn test_oversized_entry_fails() {
        let big = vec![b'a'; 4096];
        let bytes = build_zip(&[("big.txt", &big)]);
        let err = expand(&bytes, None).unwrap_err();
        assert!(matches!(err, AppError::Archive(_)), "got {:?}", err);
    }

    fn staged(path: &str, data: &[u8]) -> StagedFile {
        StagedFile {
            path: WorkspacePath::parse(path).unwrap(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_duplicate_paths_keep_last() {
        let mut files = StagedFiles::default();
        files.push(staged("a.txt", b"1")).unwrap();
        files.push(staged("b.txt", b"2")).unwrap();
        files.push(staged("a.txt", b"3")).unwrap();

        let files = files.into_vec();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].data, b"3");
    }

    #[test]
    fn test_total_limit_counts_replacements_once() {
        let mut files = StagedFiles::with_limit(10);
        files.push(staged("a.txt", &[0; 6])).unwrap();
        files.push(staged("a.txt", &[0; 8])).unwrap();

        let err = files.push(staged("b.txt", &[0; 3])).unwrap_err();
        assert!(matches!(err, AppError::UploadTooLarge { .. }), "got {:?}", err);
        assert_eq!(files.into_vec().len(), 1);
    }

    #[test]
    fn test_archive_past_total_limit_fails() {
        let entry = vec![b'z'; 400];
        let bytes = build_zip(&[("1.txt", &entry), ("2.txt", &entry), ("3.txt", &entry)]);

        let mut files = StagedFiles::with_limit(1000);
        let err = ArchiveExpander::new(1024)
            .expand("bomb.zip", &bytes, None, &mut files)
            .unwrap_err();
        assert!(matches!(err, AppError::UploadTooLarge { .. }), "got {:?}", err);
    }

    #[test]
    fn test_file_and_folder_with_same_path_conflict() {
        let mut files = StagedFiles::default();
        files.push(staged("a/b/c.txt", b"deep")).unwrap();
        files.push(staged("a", b"file")).unwrap();

        let (file, nested) = files.find_conflict().unwrap();
        assert_eq!(file.as_str(), "a");
        assert_eq!(nested.as_str(), "a/b/c.txt");

        let mut files = StagedFiles::default();
        files.push(staged("a/b.txt", b"1")).unwrap();
        files.push(staged("ab.txt", b"2")).unwrap();
        assert!(files.find_conflict().is_none());
    }

    #[test]
    fn test_archive_names() {
        assert!(is_archive_name("project.zip"));
        assert!(is_archive_name("PROJECT.ZIP"));
        assert!(!is_archive_name("zip.txt"));
    }
}
