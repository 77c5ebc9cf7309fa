//! Trestle - dependency engine maintenance CLI
//!
//! Entry point that dispatches to subcommands.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use trestle::cli::{Cli, Commands};
use trestle::config::EngineConfigManager;
use trestle::error::TrestleResult;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> TrestleResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("trestle=warn"),
        1 => EnvFilter::new("trestle=info"),
        _ => EnvFilter::new("trestle=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let config_manager = match cli.config {
        Some(path) => EngineConfigManager::with_path(path),
        None => EngineConfigManager::new(),
    };
    let config = config_manager.load()?;

    match cli.command {
        Commands::Cache(args) => trestle::cli::commands::cache(args, &config),
        Commands::Config(args) => trestle::cli::commands::config(args, &config_manager, &config),
    }
}
