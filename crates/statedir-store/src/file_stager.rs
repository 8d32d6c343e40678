//! File stager
//!
//! Content is written to `T.new` and renamed over `T` in a single step. When
//! the live slot is a directory it is retired to `T.old` first, since a file
//! cannot be renamed over a directory.

use crate::elapsed_ms;
use crate::errors::{sync_error, write_error, Result};
use crate::options::{FileMode, FileOptions};
use crate::promote::promote;
use crate::slots::{discard_slots, probe_slot, purge_slots, SlotKind, SlotPaths};
use statedir_core::{log_op_abort, log_op_end, log_op_error, log_op_start, StageError};
use statedir_core_types::OperationId;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// A staging file open for writing
///
/// Implements [`Write`]. In text mode raw writes are checked as UTF-8 too,
/// and a file holding anything else cannot be committed. Dropping the guard
/// without calling [`commit`](Self::commit) deletes the staging file and
/// leaves live alone.
#[derive(Debug)]
pub struct StagedFile {
    slots: SlotPaths,
    options: FileOptions,
    op_id: OperationId,
    writer: Option<BufWriter<File>>,
    text: Utf8Check,
    armed: bool,
}

/// Incremental UTF-8 check over a byte stream split at arbitrary points
#[derive(Debug, Default)]
struct Utf8Check {
    /// Leading bytes of a character whose remaining bytes have not arrived
    tail: Vec<u8>,
    invalid: bool,
}

impl Utf8Check {
    /// Returns false once the stream has held an invalid sequence
    fn feed(&mut self, bytes: &[u8]) -> bool {
        if self.invalid {
            return false;
        }
        let joined;
        let chunk = if self.tail.is_empty() {
            bytes
        } else {
            joined = [self.tail.as_slice(), bytes].concat();
            joined.as_slice()
        };
        match std::str::from_utf8(chunk) {
            Ok(_) => self.tail.clear(),
            Err(e) if e.error_len().is_none() => self.tail = chunk[e.valid_up_to()..].to_vec(),
            Err(_) => self.invalid = true,
        }
        !self.invalid
    }

    /// Everything fed so far is valid and ends on a character boundary
    fn is_complete(&self) -> bool {
        !self.invalid && self.tail.is_empty()
    }
}

impl StagedFile {
    /// Purge crash debris for `target` and open `target.new` for writing
    ///
    /// # Errors
    ///
    /// Returns an error if `target` has no file name, if a stale slot cannot
    /// be purged or restored, or if the staging file cannot be created.
    pub fn begin(target: impl AsRef<Path>, options: FileOptions) -> Result<Self> {
        let slots = SlotPaths::for_target(target)?;
        purge_slots(&slots, options.stage.recovery)?;

        let file = open_staging(&slots.staging, &options).map_err(|source| {
            StageError::OpenStaging {
                path: slots.staging.clone(),
                source,
            }
        })?;

        let op_id = OperationId::new();
        tracing::debug!(
            op_id = %op_id,
            target_path = %slots.live.display(),
            mode = ?options.mode,
            "opened staging file"
        );

        Ok(Self {
            slots,
            options,
            op_id,
            writer: Some(BufWriter::new(file)),
            text: Utf8Check::default(),
            armed: true,
        })
    }

    /// The staging file path
    pub fn path(&self) -> &Path {
        &self.slots.staging
    }

    /// The live path the file will be published at
    pub fn target(&self) -> &Path {
        &self.slots.live
    }

    pub fn mode(&self) -> FileMode {
        self.options.mode
    }

    pub fn op_id(&self) -> &OperationId {
        &self.op_id
    }

    /// Write UTF-8 text; rejected for files opened in binary mode
    ///
    /// # Errors
    ///
    /// Returns [`StageError::TextOnBinary`] in binary mode and
    /// [`StageError::WriteStaging`] if the write itself fails.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        if self.options.mode == FileMode::Binary {
            return Err(StageError::TextOnBinary {
                path: self.slots.staging.clone(),
            });
        }
        let path = self.slots.staging.clone();
        self.write_all(text.as_bytes())
            .map_err(|e| write_error(&path, e))
    }

    /// Flush the staged content and publish it as the live slot
    ///
    /// # Errors
    ///
    /// A flush or fsync failure discards the staging file, as does text-mode
    /// content that is not valid UTF-8 ([`StageError::InvalidText`]). A
    /// failed rename leaves it in place for the next `begin` to purge.
    pub fn commit(mut self) -> Result<()> {
        self.finish()?;
        self.armed = false;
        let live_is_dir = probe_slot(&self.slots.live)? == SlotKind::Directory;
        promote(&self.slots, &self.options.stage, live_is_dir)
    }

    /// Discard the staged content, reporting cleanup failures
    ///
    /// # Errors
    ///
    /// Returns [`StageError::PurgeSlot`] if the staging file cannot be
    /// removed. Staging that is already gone is not an error.
    pub fn abort(mut self) -> Result<()> {
        self.armed = false;
        self.close_without_flush();
        discard_slots(&self.slots)
    }

    fn finish(&mut self) -> Result<()> {
        if self.options.mode == FileMode::Text && !self.text.is_complete() {
            return Err(StageError::InvalidText {
                path: self.slots.staging.clone(),
            });
        }
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let file = writer
            .into_inner()
            .map_err(|e| write_error(&self.slots.staging, e.into_error()))?;
        if self.options.stage.sync {
            file.sync_all()
                .map_err(|e| sync_error(&self.slots.staging, e))?;
        }
        Ok(())
    }

    fn close_without_flush(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.into_parts();
        }
    }

    fn writer_mut(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "staging file is closed"))
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer_mut()?.write(buf)?;
        if self.options.mode == FileMode::Text && !self.text.feed(&buf[..written]) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "text staging file received bytes that are not valid UTF-8",
            ));
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer_mut()?.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.close_without_flush();
        if let Err(err) = discard_slots(&self.slots) {
            tracing::warn!(
                op_id = %self.op_id,
                target_path = %self.slots.live.display(),
                error = %err,
                "failed to discard staging file"
            );
        }
    }
}

fn open_staging(path: &Path, options: &FileOptions) -> io::Result<File> {
    let mut open = OpenOptions::new();
    // Purge just removed any stale file, so an existing one means a concurrent writer
    open.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if let Some(mode) = options.permissions {
            open.mode(mode);
        }
    }
    #[cfg(not(unix))]
    let _ = options;

    open.open(path)
}

/// Replace the file at `target` with whatever `populate` writes
///
/// `populate` returning `Ok` commits; returning `Err` deletes the staging file
/// and hands the error back unchanged.
///
/// # Errors
///
/// Returns `populate`'s own error unchanged, or a [`StageError`] converted
/// into `E` when the staging file cannot be prepared or committed.
///
/// # Example
///
/// ```no_run
/// use statedir_core::StageError;
/// use statedir_store::{stage_file, FileOptions};
///
/// stage_file("/var/lib/fetch/index.txt", FileOptions::text(), |file| {
///     file.write_text("zlib 1.3.1\n")
/// })?;
/// # Ok::<(), StageError>(())
/// ```
pub fn stage_file<T, E, F>(
    target: impl AsRef<Path>,
    options: FileOptions,
    populate: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&mut StagedFile) -> std::result::Result<T, E>,
    E: From<StageError>,
{
    let target = target.as_ref();
    let started = Instant::now();
    log_op_start!("stage_file", target_path = %target.display());

    let mut staged = match StagedFile::begin(target, options) {
        Ok(staged) => staged,
        Err(err) => {
            log_op_error!(
                "stage_file",
                &err,
                duration_ms = elapsed_ms(started),
                target_path = %target.display()
            );
            return Err(err.into());
        }
    };
    let op_id = *staged.op_id();

    match populate(&mut staged) {
        Ok(value) => match staged.commit() {
            Ok(()) => {
                log_op_end!(
                    "stage_file",
                    duration_ms = elapsed_ms(started),
                    target_path = %target.display(),
                    op_id = %op_id
                );
                Ok(value)
            }
            Err(err) => {
                log_op_error!(
                    "stage_file",
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
                    "failed to discard staging file"
                );
            }
            log_op_abort!(
                "stage_file",
                duration_ms = elapsed_ms(started),
                target_path = %target.display(),
                op_id = %op_id
            );
            Err(err)
        }
    }
}
