//! statedir Store - crash-safe publication of directories and files
//!
//! Provides:
//! - Slot layout (`T`, `T.new`, `T.old`) and idempotent purge of crash debris
//! - Directory stager: replace a whole tree through a staging directory
//! - File stager: replace a single file through a staging file
//! - Slot inspection for tooling that looks at crash debris

pub mod dir_stager;
pub mod errors;
pub mod file_stager;
pub mod options;
mod promote;
pub mod slots;

// Re-export key types
pub use dir_stager::{stage_dir, StagedDir};
pub use errors::Result;
pub use file_stager::{stage_file, StagedFile};
pub use options::{FileMode, FileOptions, RecoveryPolicy, StageOptions};
pub use slots::{inspect, purge, PurgeOutcome, SlotKind, SlotPaths, SlotReport};

use std::time::Instant;

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
