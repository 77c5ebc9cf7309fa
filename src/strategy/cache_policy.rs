//! Version caching policy
//!
//! Holds the TTL rules for dynamic-version re-resolution and
//! changing-module re-fetch. A TTL of zero means "always re-check".

use crate::error::{TrestleError, TrestleResult};
use crate::strategy::mutation::{AllowAll, MutationKind, MutationValidator};
use std::sync::Arc;
use std::time::Duration;

/// Engine default for both TTLs when the build does not configure them
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Time units accepted by the TTL configuration calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Parse a unit name. This is the single boundary where unparsed
    /// unit strings are allowed; everything past it works on typed
    /// values.
    pub fn parse(unit: &str) -> TrestleResult<Self> {
        match unit.trim().to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Seconds),
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            _ => Err(TrestleError::InvalidTimeUnit { unit: unit.into() }),
        }
    }

    /// Convert an amount in this unit to a duration
    pub fn duration(&self, amount: u64) -> Duration {
        let secs = match self {
            Self::Seconds => amount,
            Self::Minutes => amount * 60,
            Self::Hours => amount * 60 * 60,
            Self::Days => amount * 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }
}

/// TTL rules for cached version information
#[derive(Clone)]
pub struct CachePolicy {
    dynamic_version_ttl: Duration,
    changing_module_ttl: Duration,
    validator: Arc<dyn MutationValidator>,
}

impl std::fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePolicy")
            .field("dynamic_version_ttl", &self.dynamic_version_ttl)
            .field("changing_module_ttl", &self.changing_module_ttl)
            .finish()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            dynamic_version_ttl: DEFAULT_TTL,
            changing_module_ttl: DEFAULT_TTL,
            validator: AllowAll::shared(),
        }
    }
}

impl CachePolicy {
    /// Overwrite the dynamic-version TTL
    pub fn cache_dynamic_versions_for(
        &mut self,
        amount: u64,
        unit: TimeUnit,
    ) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.dynamic_version_ttl = unit.duration(amount);
        Ok(())
    }

    /// Overwrite the dynamic-version TTL from a unit name
    pub fn cache_dynamic_versions_for_str(
        &mut self,
        amount: u64,
        unit: &str,
    ) -> TrestleResult<()> {
        self.cache_dynamic_versions_for(amount, TimeUnit::parse(unit)?)
    }

    /// Overwrite the changing-module TTL
    pub fn cache_changing_modules_for(
        &mut self,
        amount: u64,
        unit: TimeUnit,
    ) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.changing_module_ttl = unit.duration(amount);
        Ok(())
    }

    /// Overwrite the changing-module TTL from a unit name
    pub fn cache_changing_modules_for_str(
        &mut self,
        amount: u64,
        unit: &str,
    ) -> TrestleResult<()> {
        self.cache_changing_modules_for(amount, TimeUnit::parse(unit)?)
    }

    pub fn dynamic_version_ttl(&self) -> Duration {
        self.dynamic_version_ttl
    }

    pub fn changing_module_ttl(&self) -> Duration {
        self.changing_module_ttl
    }

    /// Whether a cached dynamic-version listing of the given age must be
    /// re-resolved against the repository
    pub fn must_refresh_dynamic_version(&self, age: Duration) -> bool {
        age >= self.dynamic_version_ttl
    }

    /// Whether a changing module's cached artifacts of the given age
    /// must be re-fetched
    pub fn must_refresh_changing_module(&self, age: Duration) -> bool {
        age >= self.changing_module_ttl
    }

    /// Value copy with no shared mutable state. The copy has not begun
    /// resolution, so it carries a permissive validator.
    pub fn copy(&self) -> CachePolicy {
        CachePolicy {
            dynamic_version_ttl: self.dynamic_version_ttl,
            changing_module_ttl: self.changing_module_ttl,
            validator: AllowAll::shared(),
        }
    }

    pub fn set_mutation_validator(&mut self, validator: Arc<dyn MutationValidator>) {
        self.validator = validator;
    }
}
