pub mod archive;
pub mod path;
pub mod service;
pub mod storage;
pub mod tree;

pub use path::WorkspacePath;
pub use service::{SharedWorkspace, UploadedFile, WorkspaceService};
pub use storage::{DiskStorage, Storage};
