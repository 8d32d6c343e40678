//! Slot layout and crash-debris purge
//!
//! A target `T` owns three sibling paths: the live slot `T`, the staging slot
//! `T.new` and the backup slot `T.old`. The suffix is appended to the whole
//! file name, so `index.json` stages into `index.json.new`. Tooling that
//! inspects crash debris depends on these names.

use crate::elapsed_ms;
use crate::errors::{purge_error, sync_error, Result};
use crate::options::RecoveryPolicy;
use serde::Serialize;
use statedir_core::{log_op_end, log_op_error, log_op_start, StageError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const STAGING_SUFFIX: &str = ".new";
pub const BACKUP_SUFFIX: &str = ".old";

/// The three physical slots of a staged target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPaths {
    pub live: PathBuf,
    pub staging: PathBuf,
    pub backup: PathBuf,
}

impl SlotPaths {
    /// Derive the slot paths for `target`
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidTarget`] for paths without a final
    /// component (`/`, `..`), which have no sibling to stage into.
    pub fn for_target(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref();
        let name = target
            .file_name()
            .ok_or_else(|| StageError::InvalidTarget {
                target: target.to_path_buf(),
                reason: "path has no final component".to_string(),
            })?;
        let parent = target.parent().unwrap_or_else(|| Path::new(""));

        let sibling = |suffix: &str| {
            let mut file_name = name.to_os_string();
            file_name.push(suffix);
            parent.join(file_name)
        };

        Ok(Self {
            live: parent.join(name),
            staging: sibling(STAGING_SUFFIX),
            backup: sibling(BACKUP_SUFFIX),
        })
    }

    /// Directory holding all three slots
    pub fn parent(&self) -> &Path {
        match self.live.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

/// What currently occupies a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Absent,
    File,
    Directory,
    /// Symlink, socket, device or anything else that is not followed
    Other,
}

impl SlotKind {
    /// Probe a path without following symlinks
    pub fn probe(path: &Path) -> io::Result<Self> {
        match fs::symlink_metadata(path) {
            Ok(meta) => {
                let file_type = meta.file_type();
                Ok(if file_type.is_dir() {
                    SlotKind::Directory
                } else if file_type.is_file() {
                    SlotKind::File
                } else {
                    SlotKind::Other
                })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SlotKind::Absent),
            Err(e) => Err(e),
        }
    }

    pub fn exists(self) -> bool {
        self != SlotKind::Absent
    }
}

pub(crate) fn probe_slot(path: &Path) -> Result<SlotKind> {
    SlotKind::probe(path).map_err(|source| StageError::ProbeSlot {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove whatever occupies `path`
///
/// Returns `Ok(false)` when there was nothing to remove. Directories are
/// removed recursively; symlinks are unlinked, never followed.
pub(crate) fn remove_slot(path: &Path) -> io::Result<bool> {
    let removed = match SlotKind::probe(path)? {
        SlotKind::Absent => return Ok(false),
        SlotKind::Directory => fs::remove_dir_all(path),
        SlotKind::File | SlotKind::Other => fs::remove_file(path),
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// What a purge did to a target's slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// A stranded backup was moved back into the live slot
    pub restored_backup: bool,
    /// Stale slots that were deleted
    pub removed: Vec<PathBuf>,
}

impl PurgeOutcome {
    pub fn is_noop(&self) -> bool {
        !self.restored_backup && self.removed.is_empty()
    }
}

/// Clean crash debris for `target`
///
/// Idempotent: purging a clean target is a no-op, and purging twice has the
/// effect of purging once. The live slot is only ever touched by
/// [`RecoveryPolicy::RestoreBackup`] when it is absent.
///
/// # Errors
///
/// Returns an error if `target` has no file name, if a slot cannot be
/// probed or removed, or if a stranded backup cannot be restored.
pub fn purge(target: impl AsRef<Path>, recovery: RecoveryPolicy) -> Result<PurgeOutcome> {
    let target = target.as_ref();
    let started = Instant::now();
    log_op_start!("purge", target_path = %target.display());

    let result = SlotPaths::for_target(target).and_then(|slots| purge_slots(&slots, recovery));
    match &result {
        Ok(outcome) => {
            log_op_end!(
                "purge",
                duration_ms = elapsed_ms(started),
                target_path = %target.display(),
                restored_backup = outcome.restored_backup,
                removed = outcome.removed.len()
            );
        }
        Err(err) => {
            log_op_error!(
                "purge",
                err,
                duration_ms = elapsed_ms(started),
                target_path = %target.display()
            );
        }
    }
    result
}

pub(crate) fn purge_slots(slots: &SlotPaths, recovery: RecoveryPolicy) -> Result<PurgeOutcome> {
    let mut outcome = PurgeOutcome::default();

    if recovery == RecoveryPolicy::RestoreBackup {
        outcome.restored_backup = restore_stranded_backup(slots)?;
    }

    for path in [&slots.staging, &slots.backup] {
        if remove_slot(path).map_err(|e| purge_error(path, e))? {
            tracing::warn!(
                target_path = %slots.live.display(),
                slot = %path.display(),
                "purged stale slot"
            );
            outcome.removed.push(path.clone());
        }
    }

    Ok(outcome)
}

/// Delete staging and backup without any recovery step
pub(crate) fn discard_slots(slots: &SlotPaths) -> Result<()> {
    for path in [&slots.staging, &slots.backup] {
        remove_slot(path).map_err(|e| purge_error(path, e))?;
    }
    Ok(())
}

/// Move `T.old` back to `T` when the live slot is missing
///
/// Returns whether a restore happened.
pub(crate) fn restore_stranded_backup(slots: &SlotPaths) -> Result<bool> {
    if probe_slot(&slots.live)?.exists() || !probe_slot(&slots.backup)?.exists() {
        return Ok(false);
    }

    fs::rename(&slots.backup, &slots.live).map_err(|source| StageError::RestoreBackup {
        backup: slots.backup.clone(),
        live: slots.live.clone(),
        source,
    })?;

    tracing::warn!(
        target_path = %slots.live.display(),
        "restored stranded backup into live slot"
    );
    Ok(true)
}

/// fsync the directory holding the slots so renames survive power loss
pub(crate) fn sync_parent(slots: &SlotPaths) -> io::Result<()> {
    #[cfg(unix)]
    fs::File::open(slots.parent())?.sync_all()?;
    #[cfg(not(unix))]
    let _ = slots;
    Ok(())
}

/// fsync every regular file and directory under `root`, children first
///
/// Symlinks and special files are skipped. Directories are only synced on
/// unix, where an open handle on a directory supports it.
pub(crate) fn sync_tree(root: &Path) -> Result<()> {
    match SlotKind::probe(root).map_err(|e| sync_error(root, e))? {
        SlotKind::File => sync_path(root),
        SlotKind::Directory => {
            let entries = fs::read_dir(root).map_err(|e| sync_error(root, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| sync_error(root, e))?;
                sync_tree(&entry.path())?;
            }
            #[cfg(unix)]
            sync_path(root)?;
            Ok(())
        }
        SlotKind::Absent | SlotKind::Other => Ok(()),
    }
}

fn sync_path(path: &Path) -> Result<()> {
    fs::File::open(path)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| sync_error(path, e))
}

/// Snapshot of a target's slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub target: PathBuf,
    pub live: SlotKind,
    pub staging: SlotKind,
    pub backup: SlotKind,
}

impl SlotReport {
    /// A staging or backup slot exists
    pub fn has_debris(&self) -> bool {
        self.staging.exists() || self.backup.exists()
    }

    /// The crash window of a directory commit: live gone, backup present
    pub fn has_stranded_backup(&self) -> bool {
        !self.live.exists() && self.backup.exists()
    }
}

/// Report what occupies each slot of `target`
///
/// # Errors
///
/// Returns an error if `target` has no file name or a slot cannot be probed.
pub fn inspect(target: impl AsRef<Path>) -> Result<SlotReport> {
    let slots = SlotPaths::for_target(target)?;
    Ok(SlotReport {
        live: probe_slot(&slots.live)?,
        staging: probe_slot(&slots.staging)?,
        backup: probe_slot(&slots.backup)?,
        target: slots.live,
    })
}
