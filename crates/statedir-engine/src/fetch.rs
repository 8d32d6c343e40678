//! Fetch orchestration
//!
//! Three publication policies, one per kind of fetcher:
//!
//! - **Persistent directory**: fetched once through the directory stager, then
//!   updated in place (for example a VCS checkout).
//! - **Scratch directory**: every run stages a complete new tree.
//! - **Scratch file**: every run stages a complete new file.
//!
//! With `update` off, a target that already holds the right kind of artifact
//! is left alone.

use crate::claims::PathClaims;
use statedir_core::{log_op_end, log_op_error, log_op_start, ExError, Result};
use statedir_store::{stage_dir, stage_file, FileMode, FileOptions, StageOptions, StagedFile};
use std::path::Path;
use std::time::Instant;

/// Produces a directory tree from scratch
pub trait DirFetcher {
    /// Populate `dir`, which is empty on entry
    fn fetch(&mut self, dir: &Path) -> Result<()>;
}

/// A directory fetcher that can also refresh an existing tree
pub trait PersistentDirFetcher: DirFetcher {
    /// Bring the live tree at `dir` up to date in place
    fn update(&mut self, dir: &Path) -> Result<()>;
}

/// Produces a single file
pub trait FileFetcher {
    /// How the staging file is opened
    fn mode(&self) -> FileMode {
        FileMode::Text
    }

    fn fetch(&mut self, file: &mut StagedFile) -> Result<()>;
}

/// What a fetch run did to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A fresh artifact was staged and published
    Fetched,
    /// The live tree was updated in place
    Updated,
    /// The target already existed and no update was requested
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Refresh targets that already exist
    pub update: bool,
    pub stage: StageOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            update: true,
            stage: StageOptions::default(),
        }
    }
}

impl FetchOptions {
    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn with_stage(mut self, stage: StageOptions) -> Self {
        self.stage = stage;
        self
    }
}

/// Fetch a persistent directory, updating it in place once it exists
///
/// # Errors
///
/// Returns the fetcher's error, or the staging failure converted to
/// [`ExError`]. Errors without a target are tagged with `target`.
pub fn fetch_persistent_dir<F>(
    fetcher: &mut F,
    target: &Path,
    options: &FetchOptions,
) -> Result<FetchOutcome>
where
    F: PersistentDirFetcher + ?Sized,
{
    let started = Instant::now();
    log_op_start!("fetch_persistent_dir", target_path = %target.display());

    let result = if !target.is_dir() {
        stage_dir(target, options.stage, |dir| fetcher.fetch(dir)).map(|()| FetchOutcome::Fetched)
    } else if options.update {
        fetcher.update(target).map(|()| FetchOutcome::Updated)
    } else {
        skip(target)
    };

    finish("fetch_persistent_dir", target, started, result)
}

/// Fetch a directory from scratch on every run
///
/// # Errors
///
/// Same as [`fetch_persistent_dir`]; live is untouched on failure.
pub fn fetch_scratch_dir<F>(
    fetcher: &mut F,
    target: &Path,
    options: &FetchOptions,
) -> Result<FetchOutcome>
where
    F: DirFetcher + ?Sized,
{
    let started = Instant::now();
    log_op_start!("fetch_scratch_dir", target_path = %target.display());

    let result = if target.is_dir() && !options.update {
        skip(target)
    } else {
        stage_dir(target, options.stage, |dir| fetcher.fetch(dir)).map(|()| FetchOutcome::Fetched)
    };

    finish("fetch_scratch_dir", target, started, result)
}

/// Fetch a single file from scratch on every run
///
/// # Errors
///
/// Same as [`fetch_persistent_dir`]; a text-mode fetcher writing invalid
/// UTF-8 fails with `ERR_POPULATION`.
pub fn fetch_scratch_file<F>(
    fetcher: &mut F,
    target: &Path,
    options: &FetchOptions,
) -> Result<FetchOutcome>
where
    F: FileFetcher + ?Sized,
{
    let started = Instant::now();
    log_op_start!("fetch_scratch_file", target_path = %target.display());

    let result = if target.is_file() && !options.update {
        skip(target)
    } else {
        let file_options = FileOptions {
            mode: fetcher.mode(),
            permissions: None,
            stage: options.stage,
        };
        stage_file(target, file_options, |file| fetcher.fetch(file)).map(|()| FetchOutcome::Fetched)
    };

    finish("fetch_scratch_file", target, started, result)
}

fn skip(target: &Path) -> Result<FetchOutcome> {
    tracing::info!(target_path = %target.display(), "no update requested, skipping");
    Ok(FetchOutcome::Skipped)
}

fn finish(
    op: &'static str,
    target: &Path,
    started: Instant,
    result: Result<FetchOutcome>,
) -> Result<FetchOutcome> {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    match &result {
        Ok(outcome) => {
            log_op_end!(
                op,
                duration_ms = duration_ms,
                target_path = %target.display(),
                outcome = ?outcome
            );
        }
        Err(err) => {
            log_op_error!(
                op,
                err.clone(),
                duration_ms = duration_ms,
                target_path = %target.display()
            );
        }
    }
    result.map_err(|err: ExError| match err.target() {
        Some(_) => err,
        None => err.with_target(target),
    })
}

/// Runs fetchers with one job per target path
///
/// Cloning shares the claim registry, so clones handed to worker threads
/// still exclude each other.
#[derive(Debug, Clone, Default)]
pub struct FetchRunner {
    claims: PathClaims,
    options: FetchOptions,
}

impl FetchRunner {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            claims: PathClaims::new(),
            options,
        }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn claims(&self) -> &PathClaims {
        &self.claims
    }

    /// Claim `target` and run [`fetch_persistent_dir`]
    ///
    /// # Errors
    ///
    /// Returns `ERR_CONCURRENCY` if another job holds `target`, otherwise
    /// whatever [`fetch_persistent_dir`] returns.
    pub fn persistent_dir<F>(&self, fetcher: &mut F, target: &Path) -> Result<FetchOutcome>
    where
        F: PersistentDirFetcher + ?Sized,
    {
        let _claim = self.claims.claim(target)?;
        fetch_persistent_dir(fetcher, target, &self.options)
    }

    /// Claim `target` and run [`fetch_scratch_dir`]
    ///
    /// # Errors
    ///
    /// Returns `ERR_CONCURRENCY` if another job holds `target`, otherwise
    /// whatever [`fetch_scratch_dir`] returns.
    pub fn scratch_dir<F>(&self, fetcher: &mut F, target: &Path) -> Result<FetchOutcome>
    where
        F: DirFetcher + ?Sized,
    {
        let _claim = self.claims.claim(target)?;
        fetch_scratch_dir(fetcher, target, &self.options)
    }

    /// Claim `target` and run [`fetch_scratch_file`]
    ///
    /// # Errors
    ///
    /// Returns `ERR_CONCURRENCY` if another job holds `target`, otherwise
    /// whatever [`fetch_scratch_file`] returns.
    pub fn scratch_file<F>(&self, fetcher: &mut F, target: &Path) -> Result<FetchOutcome>
    where
        F: FileFetcher + ?Sized,
    {
        let _claim = self.claims.claim(target)?;
        fetch_scratch_file(fetcher, target, &self.options)
    }
}
