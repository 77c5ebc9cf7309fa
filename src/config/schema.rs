//! Engine configuration schema
//!
//! Configuration is stored at `~/.config/trestle/config.toml` and
//! populates a [`ResolutionStrategy`] through its public mutators, so
//! file-driven configuration runs through the same validation as
//! programmatic configuration.
//!
//! [`ResolutionStrategy`]: crate::strategy::ResolutionStrategy

use crate::cache::{GuardPolicy, WorkspaceCacheOptions};
use crate::error::TrestleResult;
use crate::strategy::{ConflictResolution, ResolutionStrategy, SortOrder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Resolution strategy defaults
    pub resolution: ResolutionSection,

    /// Workspace cache settings
    pub cache: CacheSection,
}

/// A TTL expressed as amount + unit name, parsed at apply time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlSpec {
    pub amount: u64,
    pub unit: String,
}

/// `[resolution]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolutionSection {
    /// Module versions to pin, as `group:name:version` notations
    pub forced_modules: Vec<String>,

    /// Conflict-resolution mode
    pub conflict: ConflictResolution,

    /// Enable dependency locking
    pub dependency_locking: bool,

    /// Ordering applied to resolved artifacts
    pub sort_order: SortOrder,

    /// Always walk the full graph for task dependencies
    pub assume_fluid_dependencies: bool,

    /// Re-resolution interval for dynamic versions
    pub dynamic_versions_ttl: Option<TtlSpec>,

    /// Re-fetch interval for changing modules
    pub changing_modules_ttl: Option<TtlSpec>,
}

impl Default for ResolutionSection {
    fn default() -> Self {
        Self {
            forced_modules: Vec::new(),
            conflict: ConflictResolution::Latest,
            dependency_locking: false,
            sort_order: SortOrder::Default,
            assume_fluid_dependencies: false,
            dynamic_versions_ttl: None,
            changing_modules_ttl: None,
        }
    }
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheSection {
    /// Cache root; defaults to `<user cache dir>/trestle/transforms`
    pub root: Option<PathBuf>,

    /// Entries unused for longer than this many days are cleaned up
    pub max_age_days: u64,

    /// Keyed-guard policy for in-process exclusion
    pub guard: GuardPolicy,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            root: None,
            max_age_days: 7,
            guard: GuardPolicy::default(),
        }
    }
}

impl CacheSection {
    /// The configured root, or the per-user default location
    pub fn root_or_default(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trestle")
                .join("transforms")
        })
    }

    pub fn workspace_options(&self) -> WorkspaceCacheOptions {
        WorkspaceCacheOptions {
            max_age: Duration::from_secs(self.max_age_days * 24 * 60 * 60),
            guard: self.guard,
        }
    }
}

impl EngineConfig {
    /// Populate a strategy from this configuration
    pub fn apply_to(&self, strategy: &mut ResolutionStrategy) -> TrestleResult<()> {
        let resolution = &self.resolution;
        if !resolution.forced_modules.is_empty() {
            strategy.set_forced_modules(resolution.forced_modules.iter().cloned())?;
        }
        match resolution.conflict {
            ConflictResolution::Strict => {
                strategy.fail_on_version_conflict()?;
            }
            ConflictResolution::PreferProjectModules => {
                strategy.prefer_project_modules()?;
            }
            ConflictResolution::Latest => {}
        }
        if resolution.dependency_locking {
            strategy.activate_dependency_locking()?;
        }
        strategy.sort_artifacts(resolution.sort_order)?;
        if resolution.assume_fluid_dependencies {
            strategy.assume_fluid_dependencies()?;
        }
        if let Some(ttl) = &resolution.dynamic_versions_ttl {
            strategy.cache_dynamic_versions_for_str(ttl.amount, &ttl.unit)?;
        }
        if let Some(ttl) = &resolution.changing_modules_ttl {
            strategy.cache_changing_modules_for_str(ttl.amount, &ttl.unit)?;
        }
        Ok(())
    }
}
