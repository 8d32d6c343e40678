//! Error types
//!
//! [`StageError`] names the exact filesystem step that failed and keeps the
//! OS error untouched. [`ExError`] is the flattened form orchestrators and
//! the CLI pass around: a kind with a stable `ERR_*` code plus context.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExError>;

/// Error classification with stable codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    /// Bad target path or misuse of the API
    InvalidInput,
    /// A stale slot could not be purged or the staging slot could not be created
    Precondition,
    /// Writing, validating or syncing staged content failed before promotion
    Population,
    /// A rename, backup disposal or post-install sync during promotion failed
    CommitFailed,
    /// A stranded backup could not be moved back into the live slot
    RecoveryFailed,
    /// Another job already holds the target path
    Concurrency,
    /// A fetcher reported a failure of its own
    ExternalService,
    Io,
    Internal,
}

impl ExErrorKind {
    pub const fn code(self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Precondition => "ERR_PRECONDITION",
            ExErrorKind::Population => "ERR_POPULATION",
            ExErrorKind::CommitFailed => "ERR_COMMIT_FAILED",
            ExErrorKind::RecoveryFailed => "ERR_RECOVERY_FAILED",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Structured error carried across crate boundaries
///
/// Cheap to clone so it can be logged and returned without giving up
/// ownership.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    target: Option<PathBuf>,
    io_kind: Option<io::ErrorKind>,
    message: String,
}

impl ExError {
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            target: None,
            io_kind: None,
            message: String::new(),
        }
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Live path of the target the failure concerns
    pub fn with_target(mut self, target: impl Into<PathBuf>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_io_kind(mut self, kind: io::ErrorKind) -> Self {
        self.io_kind = Some(kind);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    /// Kind of the OS error underneath, when there was one
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.io_kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ExError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())?;
        if let Some(op) = &self.op {
            write!(f, " during {op}")?;
        }
        if let Some(target) = &self.target {
            write!(f, " on {}", target.display())?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

/// Failures of the staging primitive, one variant per failure site
///
/// Variants wrapping a filesystem call carry the `std::io::Error` exactly as
/// the OS returned it, reachable through `source()` or [`StageError::io_error`].
#[derive(Error, Debug)]
pub enum StageError {
    /// The target path has no file name to derive sibling slots from
    #[error("Invalid target {}: {reason}", .target.display())]
    InvalidTarget { target: PathBuf, reason: String },

    /// The type of a slot could not be determined
    #[error("Failed to probe slot {}", .path.display())]
    ProbeSlot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stale staging or backup slot could not be removed
    #[error("Failed to purge stale slot {}", .path.display())]
    PurgeSlot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The empty staging directory could not be created
    #[error("Failed to create staging directory {}", .path.display())]
    CreateStaging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The staging file could not be opened for writing
    #[error("Failed to open staging file {}", .path.display())]
    OpenStaging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or flushing staged bytes failed
    #[error("Failed to write staging file {}", .path.display())]
    WriteStaging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Staged text-mode content is not valid UTF-8
    #[error("Staged text in {} is not valid UTF-8", .path.display())]
    InvalidText { path: PathBuf },

    /// fsync of staged content failed before promotion
    #[error("Failed to sync {}", .path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Moving the live slot aside to the backup slot failed
    #[error("Failed to retire {} to {}", .live.display(), .backup.display())]
    RetireLive {
        live: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Renaming the staging slot onto the live slot failed
    #[error("Failed to install {} as {}", .staging.display(), .live.display())]
    InstallStaging {
        staging: PathBuf,
        live: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new artifact is live but its parent directory could not be synced
    #[error("Installed {} but failed to sync its directory", .path.display())]
    SyncInstalled {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new artifact is live but the retired one could not be deleted
    #[error("Failed to discard backup slot {}", .path.display())]
    DiscardBackup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A stranded backup could not be moved back into the live slot
    #[error("Failed to restore {} to {}", .backup.display(), .live.display())]
    RestoreBackup {
        backup: PathBuf,
        live: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `write_text` was called on a staging file opened in binary mode
    #[error("Text write on binary staging file {}", .path.display())]
    TextOnBinary { path: PathBuf },
}

impl StageError {
    /// Get the structured kind for this failure site
    pub fn kind(&self) -> ExErrorKind {
        match self {
            StageError::InvalidTarget { .. } | StageError::TextOnBinary { .. } => {
                ExErrorKind::InvalidInput
            }
            StageError::ProbeSlot { .. } => ExErrorKind::Io,
            StageError::PurgeSlot { .. }
            | StageError::CreateStaging { .. }
            | StageError::OpenStaging { .. } => ExErrorKind::Precondition,
            StageError::WriteStaging { .. }
            | StageError::InvalidText { .. }
            | StageError::Sync { .. } => ExErrorKind::Population,
            StageError::RetireLive { .. }
            | StageError::InstallStaging { .. }
            | StageError::SyncInstalled { .. }
            | StageError::DiscardBackup { .. } => ExErrorKind::CommitFailed,
            StageError::RestoreBackup { .. } => ExErrorKind::RecoveryFailed,
        }
    }

    /// Get the operation name used in logs and structured errors
    pub fn op(&self) -> &'static str {
        match self {
            StageError::InvalidTarget { .. } => "slot_paths",
            StageError::ProbeSlot { .. } => "probe_slot",
            StageError::PurgeSlot { .. } => "purge_slot",
            StageError::CreateStaging { .. } => "create_staging",
            StageError::OpenStaging { .. } => "open_staging",
            StageError::WriteStaging { .. } => "write_staging",
            StageError::InvalidText { .. } => "validate_text",
            StageError::Sync { .. } => "sync",
            StageError::SyncInstalled { .. } => "sync_parent",
            StageError::RetireLive { .. } => "retire_live",
            StageError::InstallStaging { .. } => "install_staging",
            StageError::DiscardBackup { .. } => "discard_backup",
            StageError::RestoreBackup { .. } => "restore_backup",
            StageError::TextOnBinary { .. } => "write_text",
        }
    }

    /// Get the path the failure is about (the live path for rename failures)
    pub fn path(&self) -> &Path {
        match self {
            StageError::InvalidTarget { target, .. } => target,
            StageError::ProbeSlot { path, .. }
            | StageError::PurgeSlot { path, .. }
            | StageError::CreateStaging { path, .. }
            | StageError::OpenStaging { path, .. }
            | StageError::WriteStaging { path, .. }
            | StageError::InvalidText { path }
            | StageError::Sync { path, .. }
            | StageError::SyncInstalled { path, .. }
            | StageError::DiscardBackup { path, .. }
            | StageError::TextOnBinary { path } => path,
            StageError::RetireLive { live, .. }
            | StageError::InstallStaging { live, .. }
            | StageError::RestoreBackup { live, .. } => live,
        }
    }

    /// Get the underlying I/O error, if this failure came from the filesystem
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            StageError::InvalidTarget { .. }
            | StageError::InvalidText { .. }
            | StageError::TextOnBinary { .. } => None,
            StageError::ProbeSlot { source, .. }
            | StageError::PurgeSlot { source, .. }
            | StageError::CreateStaging { source, .. }
            | StageError::OpenStaging { source, .. }
            | StageError::WriteStaging { source, .. }
            | StageError::Sync { source, .. }
            | StageError::SyncInstalled { source, .. }
            | StageError::RetireLive { source, .. }
            | StageError::InstallStaging { source, .. }
            | StageError::DiscardBackup { source, .. }
            | StageError::RestoreBackup { source, .. } => Some(source),
        }
    }
}

impl From<&StageError> for ExError {
    fn from(err: &StageError) -> Self {
        let mut message = err.to_string();
        if let Some(io) = err.io_error() {
            message = format!("{}: {}", message, io);
        }

        let ex = ExError::new(err.kind())
            .with_op(err.op())
            .with_target(err.path())
            .with_message(message);

        match err.io_error() {
            Some(io) => ex.with_io_kind(io.kind()),
            None => ex,
        }
    }
}

impl From<StageError> for ExError {
    fn from(err: StageError) -> Self {
        ExError::from(&err)
    }
}

/// Create an IO error outside the staging primitive (CLI, fetchers)
pub fn io_error(operation: &str, path: &Path, err: &io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_target(path)
        .with_io_kind(err.kind())
        .with_message(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_reads_code_op_target_message() {
        let err = ExError::new(ExErrorKind::CommitFailed)
            .with_op("install_staging")
            .with_target("/srv/state/repo")
            .with_message("rename failed");

        assert_eq!(
            err.to_string(),
            "ERR_COMMIT_FAILED during install_staging on /srv/state/repo: rename failed"
        );
    }

    #[test]
    fn test_stage_error_keeps_io_error_as_source() {
        let err = StageError::PurgeSlot {
            path: PathBuf::from("/tmp/x.new"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        let source = std::error::Error::source(&err).expect("source should be set");
        let io = source.downcast_ref::<io::Error>().expect("source is io::Error");
        assert_eq!(io.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_sync_after_install_is_a_commit_failure() {
        let before = StageError::Sync {
            path: PathBuf::from("/srv/state/repo.new/data"),
            source: io::Error::from(io::ErrorKind::Other),
        };
        let after = StageError::SyncInstalled {
            path: PathBuf::from("/srv/state"),
            source: io::Error::from(io::ErrorKind::Other),
        };

        assert_eq!(before.kind(), ExErrorKind::Population);
        assert_eq!(after.kind(), ExErrorKind::CommitFailed);
        assert_eq!(ExError::from(after).code(), "ERR_COMMIT_FAILED");
    }

    #[test]
    fn test_invalid_text_has_no_io_error() {
        let err = StageError::InvalidText {
            path: PathBuf::from("/srv/state/index.txt.new"),
        };

        assert_eq!(err.kind(), ExErrorKind::Population);
        assert_eq!(err.op(), "validate_text");
        assert!(err.io_error().is_none());
    }
}
