use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::check::CheckError;
use crate::storage::SnapshotError;

/// Error type for administrative operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Snapshot file not found at the specified path.
    #[error("snapshot not found: {0}")]
    MissingSnapshot(PathBuf),
    /// Snapshot could not be loaded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// The check could not run to completion.
    #[error(transparent)]
    Check(#[from] CheckError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

impl AdminError {
    pub(crate) fn missing_snapshot(path: impl AsRef<Path>) -> Self {
        AdminError::MissingSnapshot(path.as_ref().to_path_buf())
    }
}
