//! statedir CLI
//!
//! Command-line interface for inspecting, purging and publishing staged targets

use clap::{Parser, Subcommand, ValueEnum};
use statedir_core::logging_facility::{self, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "statedir")]
#[command(about = "statedir - crash-safe publication of files and directories", long_about = None)]
struct Cli {
    /// Logging profile (RUST_LOG overrides its filter)
    #[arg(long, global = true, value_enum, default_value_t = LogProfile::Dev)]
    log_profile: LogProfile,

    /// fsync staged content and the parent directory on commit
    #[arg(long, global = true)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogProfile {
    Dev,
    Prod,
}

impl From<LogProfile> for Profile {
    fn from(profile: LogProfile) -> Self {
        match profile {
            LogProfile::Dev => Profile::Development,
            LogProfile::Prod => Profile::Production,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show what occupies the live, staging and backup slots
    Status(commands::status::StatusArgs),
    /// Clean crash debris left next to a target
    Purge(commands::purge::PurgeArgs),
    /// Publish a file (or stdin) at a target
    PublishFile(commands::publish::PublishFileArgs),
    /// Publish a copy of a directory tree at a target
    PublishDir(commands::publish::PublishDirArgs),
}

fn main() {
    let cli = Cli::parse();
    logging_facility::init(cli.log_profile.into());

    let result = match cli.command {
        Commands::Status(args) => commands::status::execute(args),
        Commands::Purge(args) => commands::purge::execute(args),
        Commands::PublishFile(args) => commands::publish::execute_file(args, cli.sync),
        Commands::PublishDir(args) => commands::publish::execute_dir(args, cli.sync),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
