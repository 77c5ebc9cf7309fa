//! Resolution strategy configuration
//!
//! A `ResolutionStrategy` is owned by exactly one build configuration
//! step. It composes dependency-substitution rules, conflict-resolution
//! policy, version-caching TTLs and locking state into the decision
//! function the graph resolver consults per dependency. The object is
//! mutable until the resolver attaches a freezing mutation validator.

pub mod cache_policy;
pub mod locking;
pub mod mutation;
pub mod substitution;

pub use cache_policy::{CachePolicy, TimeUnit};
pub use locking::{DependencyLockingProvider, NoOpDependencyLockingProvider};
pub use mutation::{AllowAll, FreezeFlag, MutationKind, MutationValidator};
pub use substitution::{
    DependencyDetails, SubstitutionAction, SubstitutionRule, SubstitutionRuleSet,
};

use crate::error::TrestleResult;
use crate::module::{parse_selectors, ModuleVersionSelector};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Policy for picking one version among conflicting requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Pick the highest requested version
    #[default]
    Latest,
    /// Fail the build on any version conflict
    Strict,
    /// Prefer modules built in this build over external ones
    PreferProjectModules,
}

/// Ordering applied to resolved artifacts
///
/// Opaque to this core beyond storage and retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Default,
    ConsumerFirst,
    DependencyFirst,
}

/// Source-control resolution capability consulted for fluid-dependency
/// detection
pub trait VcsResolver: Send + Sync {
    fn has_rules(&self) -> bool;
}

/// Resolver used when the build maps no dependencies to source control
#[derive(Debug, Default)]
pub struct NoVcsResolver;

impl NoVcsResolver {
    pub fn shared() -> Arc<dyn VcsResolver> {
        Arc::new(Self)
    }
}

impl VcsResolver for NoVcsResolver {
    fn has_rules(&self) -> bool {
        false
    }
}

/// Artifact-transform registration capability consulted for
/// fluid-dependency detection
pub trait TransformRegistry: Send + Sync {
    fn has_transforms(&self) -> bool;
}

/// Registry used when no transforms are registered
#[derive(Debug, Default)]
pub struct EmptyTransformRegistry;

impl EmptyTransformRegistry {
    pub fn shared() -> Arc<dyn TransformRegistry> {
        Arc::new(Self)
    }
}

impl TransformRegistry for EmptyTransformRegistry {
    fn has_transforms(&self) -> bool {
        false
    }
}

/// Mutable-until-frozen resolution configuration
pub struct ResolutionStrategy {
    forced_modules: Vec<String>,
    parsed_forced: Mutex<Option<Arc<Vec<ModuleVersionSelector>>>>,
    conflict_resolution: ConflictResolution,
    dependency_locking_enabled: bool,
    sort_order: SortOrder,
    assume_fluid_dependencies: bool,
    cache_policy: CachePolicy,
    local_substitutions: SubstitutionRuleSet,
    global_substitutions: Arc<SubstitutionRuleSet>,
    vcs_resolver: Arc<dyn VcsResolver>,
    transforms: Arc<dyn TransformRegistry>,
    locking_provider: Arc<dyn DependencyLockingProvider>,
    validator: Arc<dyn MutationValidator>,
}

impl std::fmt::Debug for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionStrategy")
            .field("forced_modules", &self.forced_modules)
            .field("conflict_resolution", &self.conflict_resolution)
            .field("dependency_locking_enabled", &self.dependency_locking_enabled)
            .field("sort_order", &self.sort_order)
            .field("assume_fluid_dependencies", &self.assume_fluid_dependencies)
            .field("cache_policy", &self.cache_policy)
            .field("local_substitutions", &self.local_substitutions)
            .finish()
    }
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        Self::new(
            Arc::new(SubstitutionRuleSet::new()),
            NoVcsResolver::shared(),
            EmptyTransformRegistry::shared(),
            NoOpDependencyLockingProvider::shared(),
        )
    }
}

impl ResolutionStrategy {
    /// Build a strategy wired to the engine's shared collaborators
    pub fn new(
        global_substitutions: Arc<SubstitutionRuleSet>,
        vcs_resolver: Arc<dyn VcsResolver>,
        transforms: Arc<dyn TransformRegistry>,
        locking_provider: Arc<dyn DependencyLockingProvider>,
    ) -> Self {
        Self {
            forced_modules: Vec::new(),
            parsed_forced: Mutex::new(None),
            conflict_resolution: ConflictResolution::default(),
            dependency_locking_enabled: false,
            sort_order: SortOrder::default(),
            assume_fluid_dependencies: false,
            cache_policy: CachePolicy::default(),
            local_substitutions: SubstitutionRuleSet::new(),
            global_substitutions,
            vcs_resolver,
            transforms,
            locking_provider,
            validator: AllowAll::shared(),
        }
    }

    /// Pin module versions. Appends to the forced set, preserving
    /// insertion order and dropping duplicates; notations are parsed
    /// lazily on first read.
    pub fn force<I, S>(&mut self, notations: I) -> TrestleResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        *self.parsed_forced.lock() = None;
        for notation in notations {
            let notation = notation.into();
            if !self.forced_modules.contains(&notation) {
                self.forced_modules.push(notation);
            }
        }
        Ok(self)
    }

    /// Replace the forced set atomically
    pub fn set_forced_modules<I, S>(&mut self, notations: I) -> TrestleResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.forced_modules.clear();
        self.force(notations)
    }

    /// Parsed forced modules, insertion order preserved
    ///
    /// Notations are parsed on the first read after a change; a
    /// malformed notation surfaces here rather than at [`force`] time.
    ///
    /// [`force`]: ResolutionStrategy::force
    pub fn forced_modules(&self) -> TrestleResult<Arc<Vec<ModuleVersionSelector>>> {
        let mut cache = self.parsed_forced.lock();
        if let Some(parsed) = cache.as_ref() {
            return Ok(Arc::clone(parsed));
        }
        let parsed = Arc::new(parse_selectors(
            self.forced_modules.iter().map(String::as_str),
        )?);
        *cache = Some(Arc::clone(&parsed));
        Ok(parsed)
    }

    /// Fail the build on any version conflict
    ///
    /// Switching between this and [`prefer_project_modules`] is
    /// permitted; the last call wins with no error. Known looseness in
    /// the contract, kept deliberately.
    ///
    /// [`prefer_project_modules`]: ResolutionStrategy::prefer_project_modules
    pub fn fail_on_version_conflict(&mut self) -> TrestleResult<&mut Self> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.conflict_resolution = ConflictResolution::Strict;
        Ok(self)
    }

    /// Prefer modules built in this build over external ones. Last call
    /// wins, see [`fail_on_version_conflict`].
    ///
    /// [`fail_on_version_conflict`]: ResolutionStrategy::fail_on_version_conflict
    pub fn prefer_project_modules(&mut self) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.conflict_resolution = ConflictResolution::PreferProjectModules;
        Ok(())
    }

    pub fn conflict_resolution(&self) -> ConflictResolution {
        self.conflict_resolution
    }

    pub fn sort_artifacts(&mut self, order: SortOrder) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.sort_order = order;
        Ok(())
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn activate_dependency_locking(&mut self) -> TrestleResult<&mut Self> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.dependency_locking_enabled = true;
        Ok(self)
    }

    pub fn is_dependency_locking_enabled(&self) -> bool {
        self.dependency_locking_enabled
    }

    /// The configured locking provider, or the shared no-op provider
    /// while locking is disabled
    pub fn dependency_locking_provider(&self) -> Arc<dyn DependencyLockingProvider> {
        if self.dependency_locking_enabled {
            Arc::clone(&self.locking_provider)
        } else {
            NoOpDependencyLockingProvider::shared()
        }
    }

    /// Register a per-dependency rule in the local substitution group
    pub fn each_dependency(&mut self, rule: SubstitutionRule) -> TrestleResult<&mut Self> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.local_substitutions.add_rule(rule)?;
        Ok(self)
    }

    /// Force eager graph walking regardless of registered rules
    pub fn assume_fluid_dependencies(&mut self) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.assume_fluid_dependencies = true;
        Ok(())
    }

    /// The composed decision function: forced-module rule, then local
    /// rules, then global rules
    ///
    /// Snapshots strategy state at the time of the call; later mutation
    /// of this strategy does not affect the returned action.
    pub fn dependency_substitution_rule(&self) -> TrestleResult<SubstitutionAction> {
        let forced = self.forced_modules()?;
        Ok(SubstitutionAction::compose(
            forced,
            self.local_substitutions.action(),
            self.global_substitutions.action(),
        ))
    }

    /// Whether task-dependency computation must eagerly walk the full
    /// graph
    ///
    /// Recomputed on every call; rule registration between calls is
    /// observed immediately.
    pub fn resolve_graph_to_determine_task_dependencies(&self) -> bool {
        self.assume_fluid_dependencies
            || self.local_substitutions.has_rules()
            || self.global_substitutions.has_rules()
            || self.vcs_resolver.has_rules()
            || self.transforms.has_transforms()
    }

    pub fn cache_policy(&self) -> &CachePolicy {
        &self.cache_policy
    }

    pub fn cache_policy_mut(&mut self) -> &mut CachePolicy {
        &mut self.cache_policy
    }

    /// Convenience pass-through to the cache policy
    pub fn cache_dynamic_versions_for(&mut self, amount: u64, unit: TimeUnit) -> TrestleResult<()> {
        self.cache_policy.cache_dynamic_versions_for(amount, unit)
    }

    /// Convenience pass-through accepting a unit name
    pub fn cache_dynamic_versions_for_str(&mut self, amount: u64, unit: &str) -> TrestleResult<()> {
        self.cache_policy.cache_dynamic_versions_for_str(amount, unit)
    }

    /// Convenience pass-through to the cache policy
    pub fn cache_changing_modules_for(&mut self, amount: u64, unit: TimeUnit) -> TrestleResult<()> {
        self.cache_policy.cache_changing_modules_for(amount, unit)
    }

    /// Convenience pass-through accepting a unit name
    pub fn cache_changing_modules_for_str(&mut self, amount: u64, unit: &str) -> TrestleResult<()> {
        self.cache_policy.cache_changing_modules_for_str(amount, unit)
    }

    /// Fully independent deep copy
    ///
    /// State is re-applied through the copy's own public mutators, so
    /// configuration runs through the same validation paths as normal
    /// build configuration. The copy has not begun resolution and
    /// carries a permissive validator.
    pub fn copy(&self) -> TrestleResult<ResolutionStrategy> {
        let mut out = ResolutionStrategy::new(
            Arc::clone(&self.global_substitutions),
            Arc::clone(&self.vcs_resolver),
            Arc::clone(&self.transforms),
            Arc::clone(&self.locking_provider),
        );
        out.cache_policy = self.cache_policy.copy();
        out.local_substitutions = self.local_substitutions.copy();

        match self.conflict_resolution {
            ConflictResolution::Strict => {
                out.fail_on_version_conflict()?;
            }
            ConflictResolution::PreferProjectModules => {
                out.prefer_project_modules()?;
            }
            ConflictResolution::Latest => {}
        }
        out.set_forced_modules(self.forced_modules.iter().cloned())?;
        if self.dependency_locking_enabled {
            out.activate_dependency_locking()?;
        }
        out.sort_artifacts(self.sort_order)?;
        if self.assume_fluid_dependencies {
            out.assume_fluid_dependencies()?;
        }
        Ok(out)
    }

    /// Attach a mutation validator, propagating the same instance to the
    /// nested cache policy and local substitution rules so each can
    /// independently reject a late mutation
    pub fn set_mutation_validator(&mut self, validator: Arc<dyn MutationValidator>) {
        debug!("attaching mutation validator to resolution strategy");
        self.validator = Arc::clone(&validator);
        self.cache_policy
            .set_mutation_validator(Arc::clone(&validator));
        self.local_substitutions.set_mutation_validator(validator);
    }
}
