//! Directory stager
//!
//! Replaces the tree at `T` with a tree assembled in `T.new`. A rename cannot
//! replace a non-empty directory, so commit takes two renames:
//!
//! 1. `T` → `T.old` (skipped when `T` is absent)
//! 2. `T.new` → `T`
//! 3. delete `T.old`
//!
//! A crash between 1 and 2 leaves `T` absent and the previous tree in
//! `T.old`. What the next `begin` does about it is set by [`RecoveryPolicy`].
//!
//! [`RecoveryPolicy`]: crate::options::RecoveryPolicy

use crate::elapsed_ms;
use crate::errors::Result;
use crate::options::StageOptions;
use crate::promote::promote;
use crate::slots::{discard_slots, probe_slot, purge_slots, sync_tree, SlotPaths};
use statedir_core::{log_op_abort, log_op_end, log_op_error, log_op_start, StageError};
use statedir_core_types::OperationId;
use std::fs;
use std::path::Path;
use std::time::Instant;

/// An empty staging directory waiting to be populated
///
/// Dropping the guard without calling [`commit`](Self::commit) discards the
/// staging directory, including while unwinding from a panic. Live is never
/// touched on that path.
#[derive(Debug)]
pub struct StagedDir {
    slots: SlotPaths,
    options: StageOptions,
    op_id: OperationId,
    armed: bool,
}

impl StagedDir {
    /// Purge crash debris for `target` and create an empty `target.new`
    ///
    /// # Errors
    ///
    /// Returns an error if `target` has no file name, if a stale slot cannot
    /// be purged or restored, or if the staging directory cannot be created.
    pub fn begin(target: impl AsRef<Path>) -> Result<Self> {
        Self::begin_with(target, StageOptions::default())
    }

    /// [`begin`](Self::begin) with explicit recovery and sync options
    ///
    /// # Errors
    ///
    /// Fails in the same cases as [`begin`](Self::begin).
    pub fn begin_with(target: impl AsRef<Path>, options: StageOptions) -> Result<Self> {
        let slots = SlotPaths::for_target(target)?;
        purge_slots(&slots, options.recovery)?;

        fs::create_dir(&slots.staging).map_err(|source| StageError::CreateStaging {
            path: slots.staging.clone(),
            source,
        })?;

        let op_id = OperationId::new();
        tracing::debug!(
            op_id = %op_id,
            target_path = %slots.live.display(),
            "created staging directory"
        );

        Ok(Self {
            slots,
            options,
            op_id,
            armed: true,
        })
    }

    /// The staging directory to populate
    pub fn path(&self) -> &Path {
        &self.slots.staging
    }

    /// The live path the tree will be published at
    pub fn target(&self) -> &Path {
        &self.slots.live
    }

    pub fn op_id(&self) -> &OperationId {
        &self.op_id
    }

    /// Publish the staged tree as the live slot
    ///
    /// With [`StageOptions::sync`] every file and directory in the staged tree
    /// is fsynced before live is touched, and the parent directory afterwards.
    ///
    /// # Errors
    ///
    /// A failed fsync of the staged tree discards it and leaves live as it
    /// was. A failed rename leaves the staging directory in place for the
    /// next `begin` to purge. Failures after the install rename are
    /// commit-phase errors with the new tree already live.
    pub fn commit(mut self) -> Result<()> {
        if self.options.sync {
            sync_tree(&self.slots.staging)?;
        }
        self.armed = false;
        let live_exists = probe_slot(&self.slots.live)?.exists();
        promote(&self.slots, &self.options, live_exists)
    }

    /// Discard the staged tree, reporting cleanup failures
    ///
    /// Staging that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::PurgeSlot`] if the staging directory cannot be
    /// removed.
    pub fn abort(mut self) -> Result<()> {
        self.armed = false;
        discard_slots(&self.slots)
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = discard_slots(&self.slots) {
            tracing::warn!(
                op_id = %self.op_id,
                target_path = %self.slots.live.display(),
                error = %err,
                "failed to discard staging directory"
            );
        }
    }
}

/// Replace the tree at `target` with whatever `populate` writes into the
/// staging directory
///
/// `populate` returning `Ok` commits; returning `Err` discards the staging
/// directory and hands the error back unchanged. Staging failures are
/// converted into `E` through `From<StageError>`.
///
/// # Errors
///
/// Returns `populate`'s own error unchanged, or a [`StageError`] converted
/// into `E` when the staging directory cannot be prepared or committed.
///
/// # Example
///
/// ```no_run
/// use statedir_core::StageError;
/// use statedir_store::{stage_dir, StageOptions};
///
/// stage_dir("/var/lib/fetch/repo", StageOptions::default(), |dir| {
///     std::fs::write(dir.join("packages.json"), b"[]").map_err(|source| {
///         StageError::WriteStaging { path: dir.join("packages.json"), source }
///     })
/// })?;
/// # Ok::<(), StageError>(())
/// ```
pub fn stage_dir<T, E, F>(
    target: impl AsRef<Path>,
    options: StageOptions,
    populate: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&Path) -> std::result::Result<T, E>,
    E: From<StageError>,
{
    let target = target.as_ref();
    let started = Instant::now();
    log_op_start!("stage_dir", target_path = %target.display());

    let staged = match StagedDir::begin_with(target, options) {
        Ok(staged) => staged,
        Err(err) => {
            log_op_error!(
                "stage_dir",
                &err,
                duration_ms = elapsed_ms(started),
                target_path = %target.display()
            );
            return Err(err.into());
        }
    };
    let op_id = *staged.op_id();

    match populate(staged.path()) {
        Ok(value) => match staged.commit() {
            Ok(()) => {
                log_op_end!(
                    "stage_dir",
                    duration_ms = elapsed_ms(started),
                    target_path = %target.display(),
                    op_id = %op_id
                );
                Ok(value)
            }
            Err(err) => {
                log_op_error!(
                    "stage_dir",
                    &err,
                    duration_ms = elapsed_ms(started),
                    target_path = %target.display(),
                    op_id = %op_id
                );
                Err(err.into())
            }
        },
        Err(err) => {
            if let Err(cleanup) = staged.abort() {
                tracing::warn!(
                    op_id = %op_id,
                    target_path = %target.display(),
                    error = %cleanup,
                    "failed to discard staging directory"
                );
            }
            log_op_abort!(
                "stage_dir",
                duration_ms = elapsed_ms(started),
                target_path = %target.display(),
                op_id = %op_id
            );
            Err(err)
        }
    }
}
