//! Engine configuration management

pub mod schema;

pub use schema::{CacheSection, EngineConfig, ResolutionSection, TtlSpec};

use crate::error::{TrestleError, TrestleResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads and saves the engine configuration file
pub struct EngineConfigManager {
    config_path: PathBuf,
}

impl Default for EngineConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfigManager {
    /// Create a manager for the default config path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a manager for a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trestle")
            .join("config.toml")
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration, falling back to defaults if no file exists
    pub fn load(&self) -> TrestleResult<EngineConfig> {
        if !self.config_path.exists() {
            debug!("config file not found, using defaults");
            return Ok(EngineConfig::default());
        }
        self.load_from_file(&self.config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, path: &Path) -> TrestleResult<EngineConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| TrestleError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| TrestleError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub fn save(&self, config: &EngineConfig) -> TrestleResult<()> {
        self.ensure_config_dir()?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).map_err(|e| {
            TrestleError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("configuration saved to {}", self.config_path.display());
        Ok(())
    }

    fn ensure_config_dir(&self) -> TrestleResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TrestleError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
