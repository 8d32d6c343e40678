pub mod publish;
pub mod purge;
pub mod status;

/// Error type shared by the subcommands
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
