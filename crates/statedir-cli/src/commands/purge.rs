//! Crash debris purge command

use super::CommandResult;
use clap::Args;
use statedir_store::{purge, RecoveryPolicy};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Live path of the target
    pub target: PathBuf,

    /// Delete a stranded backup instead of restoring it into the live slot
    #[arg(long)]
    pub discard_backup: bool,
}

pub fn execute(args: PurgeArgs) -> CommandResult {
    let recovery = if args.discard_backup {
        RecoveryPolicy::Discard
    } else {
        RecoveryPolicy::RestoreBackup
    };

    let outcome = purge(&args.target, recovery)?;

    if outcome.is_noop() {
        println!("Nothing to purge: {}", args.target.display());
        return Ok(());
    }

    println!("Purged {}:", args.target.display());
    if outcome.restored_backup {
        println!("  restored backup into live slot");
    }
    for path in &outcome.removed {
        println!("  removed {}", path.display());
    }

    Ok(())
}
