//! Data transfer objects (DTOs) for API responses and push events.
//!
//! These structs are serialized to JSON for frontend consumption.
//! - `entry`: FileEntry, UploadResponse, SaveFileRequest, SuccessResponse
//! - `command`: CommandResult, ExecuteRequest
//! - `event`: BroadcastEvent pushed over the WebSocket channel
//! - `workspace`: WorkspaceInfo summary

pub mod command;
pub mod entry;
pub mod event;
pub mod workspace;

pub use command::*;
pub use entry::*;
pub use event::*;
pub use workspace::*;
