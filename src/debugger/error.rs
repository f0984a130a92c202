use std::path::PathBuf;

use super::ThreadId;

/// Errors produced by debugger backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("executable not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("no such process: {0}")]
    NoSuchProcess(i32),
    #[error("no active debuggee")]
    NotActive,
    #[error("no frame information for thread {0}")]
    NoFrame(ThreadId),
    #[error("backend: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
