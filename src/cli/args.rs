use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Mirrors subtrees of a monorepo into independent repositories.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Location of the split configuration file
    #[clap(short, long, default_value = ".gitsplit.toml", env = "GITSPLIT_CONFIG")]
    pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provisions a working space from the configuration and lists its remotes
    Check,
    /// Deletes the local cache repository named in the configuration
    ClearCache,
}
