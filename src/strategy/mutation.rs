//! Mutation validation for resolution configuration
//!
//! A `MutationValidator` is attached to a [`ResolutionStrategy`] when the
//! graph resolver takes ownership of it, and is propagated to the nested
//! cache policy and substitution rules so any of the three can reject a
//! late mutation with the same policy.
//!
//! [`ResolutionStrategy`]: crate::strategy::ResolutionStrategy

use crate::error::{TrestleError, TrestleResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What kind of state a mutation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// Resolution strategy state (rules, policy, flags)
    Strategy,
}

/// Decides whether configuration state may still be mutated
pub trait MutationValidator: Send + Sync {
    /// Fails with [`TrestleError::StrategyFrozen`] once mutation is no
    /// longer allowed. Called before any state is touched, so a rejected
    /// mutation leaves no partial change behind.
    fn validate_mutation(&self, kind: MutationKind) -> TrestleResult<()>;
}

/// Permissive validator used until resolution begins
#[derive(Debug, Default)]
pub struct AllowAll;

impl AllowAll {
    pub fn shared() -> Arc<dyn MutationValidator> {
        Arc::new(Self)
    }
}

impl MutationValidator for AllowAll {
    fn validate_mutation(&self, _kind: MutationKind) -> TrestleResult<()> {
        Ok(())
    }
}

/// Validator that rejects every mutation once frozen
///
/// The graph resolver attaches one of these and calls [`freeze`] when
/// resolution starts.
///
/// [`freeze`]: FreezeFlag::freeze
#[derive(Debug, Default)]
pub struct FreezeFlag {
    frozen: AtomicBool,
}

impl FreezeFlag {
    pub fn shared() -> Arc<FreezeFlag> {
        Arc::new(Self::default())
    }

    /// Mark resolution as started; all later mutations fail
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

impl MutationValidator for FreezeFlag {
    fn validate_mutation(&self, _kind: MutationKind) -> TrestleResult<()> {
        if self.is_frozen() {
            return Err(TrestleError::StrategyFrozen);
        }
        Ok(())
    }
}
