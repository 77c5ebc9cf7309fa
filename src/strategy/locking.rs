//! Dependency locking provider
//!
//! The graph resolver asks the strategy for a locking provider; when
//! locking is disabled it receives a shared no-op provider instead of
//! an absent value.

use crate::error::TrestleResult;
use crate::module::ModuleVersionSelector;
use std::sync::Arc;

/// Supplies and persists locked dependency versions per configuration
pub trait DependencyLockingProvider: Send + Sync {
    /// Previously locked module versions for a configuration, empty
    /// when no lock state exists
    fn locked_modules(&self, configuration: &str) -> TrestleResult<Vec<ModuleVersionSelector>>;

    /// Record the resolved versions as the new lock state
    fn persist_resolved(
        &self,
        configuration: &str,
        modules: &[ModuleVersionSelector],
    ) -> TrestleResult<()>;
}

/// Provider returned while dependency locking is disabled
#[derive(Debug, Default)]
pub struct NoOpDependencyLockingProvider;

impl NoOpDependencyLockingProvider {
    pub fn shared() -> Arc<dyn DependencyLockingProvider> {
        Arc::new(Self)
    }
}

impl DependencyLockingProvider for NoOpDependencyLockingProvider {
    fn locked_modules(&self, _configuration: &str) -> TrestleResult<Vec<ModuleVersionSelector>> {
        Ok(Vec::new())
    }

    fn persist_resolved(
        &self,
        _configuration: &str,
        _modules: &[ModuleVersionSelector],
    ) -> TrestleResult<()> {
        Ok(())
    }
}
