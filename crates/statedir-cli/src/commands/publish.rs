//! Publish commands
//!
//! Both commands run through the engine's scratch policies with updates on,
//! so every run stages a complete copy and the previous artifact stays live
//! until the copy is finished.

use super::CommandResult;
use clap::Args;
use statedir_core::errors::io_error;
use statedir_core::{ExError, ExErrorKind, Result};
use statedir_engine::{DirFetcher, FetchOptions, FetchRunner, FileFetcher};
use statedir_store::{FileMode, StageOptions, StagedFile};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct PublishFileArgs {
    /// Live path to publish at
    pub target: PathBuf,

    /// Source file, or `-` for stdin
    #[arg(long)]
    pub from: PathBuf,
}

#[derive(Debug, Args)]
pub struct PublishDirArgs {
    /// Live path to publish at
    pub target: PathBuf,

    /// Source directory to copy
    #[arg(long)]
    pub from: PathBuf,
}

pub fn execute_file(args: PublishFileArgs, sync: bool) -> CommandResult {
    let mut fetcher = CopyFile { source: args.from };
    runner(sync).scratch_file(&mut fetcher, &args.target)?;
    println!("Published {}", args.target.display());
    Ok(())
}

pub fn execute_dir(args: PublishDirArgs, sync: bool) -> CommandResult {
    let mut fetcher = CopyTree { source: args.from };
    runner(sync).scratch_dir(&mut fetcher, &args.target)?;
    println!("Published {}", args.target.display());
    Ok(())
}

fn runner(sync: bool) -> FetchRunner {
    let stage = StageOptions::default().with_sync(sync);
    FetchRunner::new(FetchOptions::default().with_stage(stage))
}

/// Copies bytes from a file or stdin into the staging file
struct CopyFile {
    source: PathBuf,
}

impl FileFetcher for CopyFile {
    fn mode(&self) -> FileMode {
        FileMode::Binary
    }

    fn fetch(&mut self, file: &mut StagedFile) -> Result<()> {
        let copied = if self.source.as_os_str() == "-" {
            io::copy(&mut io::stdin().lock(), file)
        } else {
            fs::File::open(&self.source).and_then(|mut src| io::copy(&mut src, file))
        };
        let bytes = copied.map_err(|e| io_error("copy_file", &self.source, &e))?;
        tracing::debug!(source = %self.source.display(), bytes, "copied source into staging");
        Ok(())
    }
}

/// Copies a directory tree into the staging directory
struct CopyTree {
    source: PathBuf,
}

impl DirFetcher for CopyTree {
    fn fetch(&mut self, dir: &Path) -> Result<()> {
        if !self.source.is_dir() {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("copy_tree")
                .with_target(&self.source)
                .with_message("Source is not a directory"));
        }
        copy_tree(&self.source, dir)
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let entries = fs::read_dir(from).map_err(|e| io_error("copy_tree", from, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error("copy_tree", from, &e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| io_error("copy_tree", &src, &e))?;

        if file_type.is_dir() {
            fs::create_dir(&dst).map_err(|e| io_error("copy_tree", &dst, &e))?;
            copy_tree(&src, &dst)?;
        } else if file_type.is_file() {
            fs::copy(&src, &dst).map_err(|e| io_error("copy_tree", &dst, &e))?;
        } else if file_type.is_symlink() {
            copy_symlink(&src, &dst)?;
        } else {
            tracing::warn!(path = %src.display(), "skipping special file");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).map_err(|e| io_error("copy_tree", src, &e))?;
    std::os::unix::fs::symlink(link, dst).map_err(|e| io_error("copy_tree", dst, &e))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    tracing::warn!(path = %src.display(), "skipping symlink");
    Ok(())
}
