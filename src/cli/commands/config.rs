//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{EngineConfig, EngineConfigManager};
use crate::error::TrestleResult;

/// Execute the config command
pub fn execute(
    args: ConfigArgs,
    manager: &EngineConfigManager,
    config: &EngineConfig,
) -> TrestleResult<()> {
    match args.action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", manager.config_path().display());
            Ok(())
        }
    }
}
