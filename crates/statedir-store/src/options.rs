//! Staging configuration

/// What `begin` does with a backup slot left behind by a crash
///
/// A crash between the two renames of a directory commit leaves the live slot
/// absent, the previous artifact in `T.old` and the new one in `T.new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Purge staging and backup unconditionally; the previous artifact is lost
    Discard,
    /// Move a stranded backup back into the live slot when live is absent
    #[default]
    RestoreBackup,
}

/// Options shared by both stagers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageOptions {
    pub recovery: RecoveryPolicy,
    /// fsync every staged file and directory before live is touched, and the
    /// parent directory once the new artifact is installed
    pub sync: bool,
}

impl StageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// How the staging file accepts content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Raw bytes through `std::io::Write`; `write_text` is rejected
    #[default]
    Binary,
    /// UTF-8 text; `write_text` is accepted alongside raw writes, and commit
    /// refuses content that is not valid UTF-8
    Text,
}

/// Options for the file stager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileOptions {
    pub mode: FileMode,
    /// Unix permission bits for the new file; ignored elsewhere
    pub permissions: Option<u32>,
    pub stage: StageOptions,
}

impl FileOptions {
    /// Binary mode with default staging options
    pub fn binary() -> Self {
        Self {
            mode: FileMode::Binary,
            ..Self::default()
        }
    }

    /// UTF-8 text mode with default staging options
    pub fn text() -> Self {
        Self {
            mode: FileMode::Text,
            ..Self::default()
        }
    }

    pub fn with_permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode);
        self
    }

    pub fn with_stage(mut self, stage: StageOptions) -> Self {
        self.stage = stage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_restore_backup_without_sync() {
        let opts = StageOptions::default();
        assert_eq!(opts.recovery, RecoveryPolicy::RestoreBackup);
        assert!(!opts.sync);
    }

    #[test]
    fn test_file_option_builders() {
        let opts = FileOptions::text()
            .with_permissions(0o640)
            .with_stage(StageOptions::new().with_sync(true));

        assert_eq!(opts.mode, FileMode::Text);
        assert_eq!(opts.permissions, Some(0o640));
        assert!(opts.stage.sync);
        assert_eq!(FileOptions::binary().mode, FileMode::Binary);
    }
}
