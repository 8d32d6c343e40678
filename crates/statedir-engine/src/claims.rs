//! Per-target mutual exclusion within one process
//!
//! The stagers do no locking, so two jobs publishing the same target would
//! purge each other's staging slot. Jobs take a [`PathClaim`] first; a second
//! claim on the same target fails with `ExErrorKind::Concurrency` instead of
//! waiting.

use statedir_core::errors::io_error;
use statedir_core::{ExError, ExErrorKind, Result};
use statedir_store::SlotPaths;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Registry of targets with a job in flight
#[derive(Debug, Clone, Default)]
pub struct PathClaims {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target` for the lifetime of the returned guard
    ///
    /// # Errors
    ///
    /// `Concurrency` if another guard holds the same target.
    pub fn claim(&self, target: impl AsRef<Path>) -> Result<PathClaim> {
        let key = claim_key(target.as_ref())?;
        let mut held = self.held.lock().map_err(|_| poisoned())?;

        if !held.insert(key.clone()) {
            return Err(ExError::new(ExErrorKind::Concurrency)
                .with_op("claim_path")
                .with_target(key)
                .with_message("Another job is already staging this target"));
        }

        tracing::debug!(target_path = %key.display(), "claimed target");
        Ok(PathClaim {
            held: Arc::clone(&self.held),
            key,
        })
    }

    pub fn is_claimed(&self, target: impl AsRef<Path>) -> bool {
        let Ok(key) = claim_key(target.as_ref()) else {
            return false;
        };
        self.held
            .lock()
            .map(|held| held.contains(&key))
            .unwrap_or(false)
    }
}

/// Guard releasing its target on drop
#[derive(Debug)]
pub struct PathClaim {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    key: PathBuf,
}

impl PathClaim {
    pub fn target(&self) -> &Path {
        &self.key
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        self.held
            .lock()
            .map(|mut held| held.remove(&self.key))
            .ok();
    }
}

/// Key claims by the absolute live path so `repo`, `./repo` and `repo/` collide
fn claim_key(target: &Path) -> Result<PathBuf> {
    let live = SlotPaths::for_target(target)?.live;
    let live: PathBuf = live
        .components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect();

    if live.is_absolute() {
        return Ok(live);
    }
    let cwd = std::env::current_dir().map_err(|e| io_error("claim_path", target, &e))?;
    Ok(cwd.join(live))
}

fn poisoned() -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("claim_path")
        .with_message("Path claim registry lock poisoned")
}
