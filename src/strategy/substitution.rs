//! Dependency substitution rules
//!
//! Substitution is an ordered composition of three rule groups: the
//! forced-module rule, per-configuration local rules, and engine-wide
//! global rules. Groups run unconditionally in that order for every
//! dependency; only the forced-module check short-circuits internally
//! once a forced selector matches.

use crate::error::TrestleResult;
use crate::module::ModuleVersionSelector;
use crate::strategy::mutation::{AllowAll, MutationKind, MutationValidator};
use std::sync::Arc;
use tracing::debug;

/// One dependency being resolved, exposed to substitution rules
///
/// Rules see the current target (which an earlier rule may already have
/// rewritten) and may redirect it again via [`use_target`].
///
/// [`use_target`]: DependencyDetails::use_target
#[derive(Debug, Clone)]
pub struct DependencyDetails {
    requested: ModuleVersionSelector,
    target: ModuleVersionSelector,
    selection_reason: Option<String>,
}

impl DependencyDetails {
    pub fn new(requested: ModuleVersionSelector) -> Self {
        Self {
            target: requested.clone(),
            requested,
            selection_reason: None,
        }
    }

    /// The originally requested coordinates
    pub fn requested(&self) -> &ModuleVersionSelector {
        &self.requested
    }

    /// The coordinates resolution will use
    pub fn target(&self) -> &ModuleVersionSelector {
        &self.target
    }

    /// Redirect resolution to different coordinates
    pub fn use_target(
        &mut self,
        target: ModuleVersionSelector,
        reason: impl Into<String>,
    ) {
        self.target = target;
        self.selection_reason = Some(reason.into());
    }

    /// Redirect to the same module at a different version
    pub fn use_version(&mut self, version: impl Into<String>, reason: impl Into<String>) {
        let target = ModuleVersionSelector::new(
            self.target.group.clone(),
            self.target.name.clone(),
            version,
        );
        self.use_target(target, reason);
    }

    /// Whether any rule redirected this dependency
    pub fn is_updated(&self) -> bool {
        self.target != self.requested
    }

    pub fn selection_reason(&self) -> Option<&str> {
        self.selection_reason.as_deref()
    }
}

/// A user-defined per-dependency rule
pub type SubstitutionRule = Arc<dyn Fn(&mut DependencyDetails) + Send + Sync>;

/// An ordered, mutable-until-frozen collection of substitution rules
#[derive(Clone)]
pub struct SubstitutionRuleSet {
    rules: Vec<SubstitutionRule>,
    validator: Arc<dyn MutationValidator>,
}

impl std::fmt::Debug for SubstitutionRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubstitutionRuleSet")
            .field("rules", &self.rules.len())
            .finish()
    }
}

impl Default for SubstitutionRuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstitutionRuleSet {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            validator: AllowAll::shared(),
        }
    }

    /// Register a rule at the end of the group
    pub fn add_rule(&mut self, rule: SubstitutionRule) -> TrestleResult<()> {
        self.validator.validate_mutation(MutationKind::Strategy)?;
        self.rules.push(rule);
        Ok(())
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Snapshot the current rules as one composable action
    pub fn action(&self) -> SubstitutionAction {
        if self.rules.is_empty() {
            return SubstitutionAction::empty();
        }
        SubstitutionAction {
            groups: vec![RuleGroup::Chain(self.rules.clone())],
        }
    }

    /// Independent container re-registering the same rules. Rule
    /// closures are shared by `Arc`; the containers are not.
    pub fn copy(&self) -> SubstitutionRuleSet {
        SubstitutionRuleSet {
            rules: self.rules.clone(),
            validator: AllowAll::shared(),
        }
    }

    pub fn set_mutation_validator(&mut self, validator: Arc<dyn MutationValidator>) {
        self.validator = validator;
    }
}

enum RuleGroup {
    /// Forced-module rewrites; scanning stops at the first match
    Forced(Arc<Vec<ModuleVersionSelector>>),
    /// User rules applied unconditionally in registration order
    Chain(Vec<SubstitutionRule>),
}

/// The composed decision function the graph resolver consults once per
/// dependency
///
/// Built from a snapshot of strategy state; later mutation of the
/// strategy does not affect an already-obtained action.
pub struct SubstitutionAction {
    groups: Vec<RuleGroup>,
}

impl SubstitutionAction {
    /// An action with no effect
    pub fn empty() -> Self {
        Self { groups: Vec::new() }
    }

    /// Compose forced modules, local rules and global rules, in that
    /// order. Empty groups compile to nothing rather than placeholders.
    pub fn compose(
        forced: Arc<Vec<ModuleVersionSelector>>,
        local: SubstitutionAction,
        global: SubstitutionAction,
    ) -> Self {
        let mut groups = Vec::new();
        if !forced.is_empty() {
            groups.push(RuleGroup::Forced(forced));
        }
        groups.extend(local.groups);
        groups.extend(global.groups);
        Self { groups }
    }

    pub fn is_noop(&self) -> bool {
        self.groups.is_empty()
    }

    /// Apply every group in sequence to one dependency
    pub fn execute(&self, details: &mut DependencyDetails) {
        for group in &self.groups {
            match group {
                RuleGroup::Forced(selectors) => {
                    for forced in selectors.iter() {
                        if forced.matches_module(details.target()) {
                            if forced.version != details.target().version {
                                debug!(
                                    requested = %details.requested(),
                                    forced = %forced,
                                    "forcing module version"
                                );
                                details.use_version(forced.version.clone(), "forced");
                            }
                            break;
                        }
                    }
                }
                RuleGroup::Chain(rules) => {
                    for rule in rules {
                        rule(details);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrestleError;
    use crate::strategy::mutation::FreezeFlag;

    fn details(notation: &str) -> DependencyDetails {
        DependencyDetails::new(ModuleVersionSelector::parse(notation).unwrap())
    }

    #[test]
    fn fresh_details_are_not_updated() {
        let d = details("org:lib:1.0");
        assert!(!d.is_updated());
        assert_eq!(d.requested(), d.target());
    }

    #[test]
    fn use_version_keeps_coordinates() {
        let mut d = details("org:lib:1.0");
        d.use_version("2.0", "test");
        assert_eq!(d.target().to_string(), "org:lib:2.0");
        assert_eq!(d.requested().to_string(), "org:lib:1.0");
        assert!(d.is_updated());
        assert_eq!(d.selection_reason(), Some("test"));
    }

    #[test]
    fn empty_rule_set_compiles_to_noop() {
        let set = SubstitutionRuleSet::new();
        assert!(!set.has_rules());
        assert!(set.action().is_noop());
    }

    #[test]
    fn forced_group_rewrites_matching_module() {
        let forced = Arc::new(vec![ModuleVersionSelector::parse("org:lib:2.0").unwrap()]);
        let action = SubstitutionAction::compose(
            forced,
            SubstitutionAction::empty(),
            SubstitutionAction::empty(),
        );

        let mut d = details("org:lib:1.0");
        action.execute(&mut d);
        assert_eq!(d.target().to_string(), "org:lib:2.0");

        let mut other = details("org:other:1.0");
        action.execute(&mut other);
        assert!(!other.is_updated());
    }

    #[test]
    fn forced_group_short_circuits_on_first_match() {
        let forced = Arc::new(vec![
            ModuleVersionSelector::parse("org:lib:2.0").unwrap(),
            ModuleVersionSelector::parse("org:lib:3.0").unwrap(),
        ]);
        let action = SubstitutionAction::compose(
            forced,
            SubstitutionAction::empty(),
            SubstitutionAction::empty(),
        );

        let mut d = details("org:lib:1.0");
        action.execute(&mut d);
        assert_eq!(d.target().version, "2.0");
    }

    #[test]
    fn groups_apply_in_sequence() {
        let mut local = SubstitutionRuleSet::new();
        local
            .add_rule(Arc::new(|d: &mut DependencyDetails| {
                if d.target().name == "lib" {
                    d.use_version("9.9", "local rule");
                }
            }))
            .unwrap();

        let mut global = SubstitutionRuleSet::new();
        global
            .add_rule(Arc::new(|d: &mut DependencyDetails| {
                if d.target().version == "9.9" {
                    d.use_target(
                        ModuleVersionSelector::new("mirror", "lib", "9.9"),
                        "global rule",
                    );
                }
            }))
            .unwrap();

        // Global rules observe the local rule's rewrite.
        let action = SubstitutionAction::compose(
            Arc::new(Vec::new()),
            local.action(),
            global.action(),
        );
        let mut d = details("org:lib:1.0");
        action.execute(&mut d);
        assert_eq!(d.target().to_string(), "mirror:lib:9.9");
        assert_eq!(d.selection_reason(), Some("global rule"));
    }

    #[test]
    fn forced_runs_before_user_rules() {
        let forced = Arc::new(vec![ModuleVersionSelector::parse("org:lib:2.0").unwrap()]);
        let mut local = SubstitutionRuleSet::new();
        local
            .add_rule(Arc::new(|d: &mut DependencyDetails| {
                assert_eq!(d.target().version, "2.0");
                d.use_version("2.1", "bump");
            }))
            .unwrap();

        let action =
            SubstitutionAction::compose(forced, local.action(), SubstitutionAction::empty());
        let mut d = details("org:lib:1.0");
        action.execute(&mut d);
        assert_eq!(d.target().version, "2.1");
    }

    #[test]
    fn frozen_rule_set_rejects_registration() {
        let flag = FreezeFlag::shared();
        let mut set = SubstitutionRuleSet::new();
        set.set_mutation_validator(flag.clone());
        flag.freeze();

        let err = set.add_rule(Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, TrestleError::StrategyFrozen));
        assert!(!set.has_rules());
    }

    #[test]
    fn copy_is_independent() {
        let mut original = SubstitutionRuleSet::new();
        original.add_rule(Arc::new(|_| {})).unwrap();

        let mut copied = original.copy();
        copied.add_rule(Arc::new(|_| {})).unwrap();

        assert_eq!(original.rules.len(), 1);
        assert_eq!(copied.rules.len(), 2);
    }

    #[test]
    fn action_is_a_snapshot() {
        let mut set = SubstitutionRuleSet::new();
        set.add_rule(Arc::new(|d: &mut DependencyDetails| {
            d.use_version("5.0", "snapshot rule");
        }))
        .unwrap();

        let action = set.action();
        // Rules added later do not affect the already-built action.
        set.add_rule(Arc::new(|d: &mut DependencyDetails| {
            d.use_version("6.0", "late rule");
        }))
        .unwrap();

        let mut d = details("org:lib:1.0");
        action.execute(&mut d);
        assert_eq!(d.target().version, "5.0");
    }
}
