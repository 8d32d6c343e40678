//! Promotion of a populated staging slot into the live slot

use crate::errors::Result;
use crate::options::{RecoveryPolicy, StageOptions};
use crate::slots::{remove_slot, restore_stranded_backup, sync_parent, SlotPaths};
use statedir_core::StageError;
use std::fs;

/// Install `T.new` as `T`
///
/// With `retire_live` the current live slot is first moved to `T.old` and
/// deleted once the new slot is in place. Without it the staging slot is
/// renamed straight over live, which replaces a file in one step.
///
/// A failed rename leaves staging where it is; the next `begin` purges it.
/// Failures after the install rename are commit-phase errors: the new
/// artifact is already live.
pub(crate) fn promote(slots: &SlotPaths, options: &StageOptions, retire_live: bool) -> Result<()> {
    if retire_live {
        fs::rename(&slots.live, &slots.backup).map_err(|source| StageError::RetireLive {
            live: slots.live.clone(),
            backup: slots.backup.clone(),
            source,
        })?;
    }

    if let Err(source) = fs::rename(&slots.staging, &slots.live) {
        if retire_live && options.recovery == RecoveryPolicy::RestoreBackup {
            if let Err(restore_err) = restore_stranded_backup(slots) {
                tracing::error!(
                    target_path = %slots.live.display(),
                    error = %restore_err,
                    "install failed and the retired live slot could not be restored"
                );
            }
        }
        return Err(StageError::InstallStaging {
            staging: slots.staging.clone(),
            live: slots.live.clone(),
            source,
        });
    }

    if retire_live {
        remove_slot(&slots.backup).map_err(|source| StageError::DiscardBackup {
            path: slots.backup.clone(),
            source,
        })?;
    }

    // Synced last so the renames and the backup removal are all covered
    if options.sync {
        sync_parent(slots).map_err(|source| StageError::SyncInstalled {
            path: slots.parent().to_path_buf(),
            source,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated(dir: &TempDir) -> SlotPaths {
        let slots = SlotPaths::for_target(dir.path().join("repo")).unwrap();
        fs::create_dir(&slots.live).unwrap();
        fs::write(slots.live.join("v"), b"1").unwrap();
        fs::create_dir(&slots.staging).unwrap();
        fs::write(slots.staging.join("v"), b"2").unwrap();
        slots
    }

    #[test]
    fn test_synced_promote_leaves_no_backup() {
        let dir = TempDir::new().unwrap();
        let slots = populated(&dir);

        promote(&slots, &StageOptions::new().with_sync(true), true).unwrap();

        assert_eq!(fs::read(slots.live.join("v")).unwrap(), b"2");
        assert!(!slots.backup.exists());
        assert!(!slots.staging.exists());
    }

    #[test]
    fn test_failed_install_restores_retired_live() {
        let dir = TempDir::new().unwrap();
        let slots = populated(&dir);
        fs::remove_dir_all(&slots.staging).unwrap();

        let err = promote(&slots, &StageOptions::default(), true).unwrap_err();

        assert!(matches!(err, StageError::InstallStaging { .. }));
        assert_eq!(fs::read(slots.live.join("v")).unwrap(), b"1");
        assert!(!slots.backup.exists());
    }
}
