//! Error handling for statedir-store
//!
//! Every staging failure is a `StageError`; helpers here attach the failing path.

use statedir_core::StageError;
use std::io;
use std::path::Path;

/// Result type alias using StageError
pub type Result<T> = std::result::Result<T, StageError>;

/// Create a purge failure for a stale slot
pub fn purge_error(path: &Path, source: io::Error) -> StageError {
    StageError::PurgeSlot {
        path: path.to_path_buf(),
        source,
    }
}

/// Create a write failure for the staging file
pub fn write_error(path: &Path, source: io::Error) -> StageError {
    StageError::WriteStaging {
        path: path.to_path_buf(),
        source,
    }
}

/// Create an fsync failure
pub fn sync_error(path: &Path, source: io::Error) -> StageError {
    StageError::Sync {
        path: path.to_path_buf(),
        source,
    }
}
