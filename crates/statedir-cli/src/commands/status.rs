//! Slot status command

use super::CommandResult;
use clap::Args;
use sha2::{Digest, Sha256};
use statedir_store::{inspect, SlotKind};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Live path of the target
    pub target: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: StatusArgs) -> CommandResult {
    let report = inspect(&args.target)?;
    let live_sha256 = match report.live {
        SlotKind::File => Some(file_digest(&report.target)?),
        _ => None,
    };

    if args.json {
        let value = serde_json::json!({
            "target": report.target,
            "live": report.live,
            "staging": report.staging,
            "backup": report.backup,
            "live_sha256": live_sha256,
            "has_debris": report.has_debris(),
            "has_stranded_backup": report.has_stranded_backup(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Target: {}", report.target.display());
    println!("  live:    {}", kind_label(report.live));
    println!("  staging: {}", kind_label(report.staging));
    println!("  backup:  {}", kind_label(report.backup));
    if let Some(digest) = live_sha256 {
        println!("  live_sha256: {}", digest);
    }
    if report.has_stranded_backup() {
        println!("  (live is missing and a backup is present; `statedir purge` restores it)");
    } else if report.has_debris() {
        println!("  (crash debris present; `statedir purge` removes it)");
    }

    Ok(())
}

fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn kind_label(kind: SlotKind) -> &'static str {
    match kind {
        SlotKind::Absent => "absent",
        SlotKind::File => "file",
        SlotKind::Directory => "directory",
        SlotKind::Other => "other",
    }
}
