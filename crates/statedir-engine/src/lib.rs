//! statedir Engine - fetch orchestration over the stagers
//!
//! Decides per target whether to fetch a fresh copy, update in place or skip,
//! and keeps one job per target path within the process.

pub mod claims;
pub mod fetch;

pub use claims::{PathClaim, PathClaims};
pub use fetch::{
    fetch_persistent_dir, fetch_scratch_dir, fetch_scratch_file, DirFetcher, FetchOptions,
    FetchOutcome, FetchRunner, FileFetcher, PersistentDirFetcher,
};
