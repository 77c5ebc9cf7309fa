//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trestle - dependency engine maintenance
///
/// Inspects and maintains the transform workspace cache and the
/// engine configuration used by dependency resolution.
#[derive(Parser, Debug)]
#[command(name = "trestle")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TRESTLE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and clean the transform workspace cache
    Cache(CacheArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Cache command arguments
#[derive(clap::Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show entry counts and sizes per subject
    Stats {
        /// Cache root directory (defaults to the configured root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove entries unused for longer than the maximum age
    Clean {
        /// Cache root directory (defaults to the configured root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Override the configured maximum age in days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

/// Config command arguments
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path
    Path,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
