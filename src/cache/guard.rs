//! Keyed mutual exclusion
//!
//! Guarantees at most one in-flight computation per key within this
//! process. Two policies share the contract: `strict` takes a per-key
//! lock unconditionally; `adaptive` tracks in-flight keys and only
//! parks a caller when same-key contention actually occurs. Distinct
//! keys never block each other, and no ordering exists across keys.
//!
//! The guard is process-local; cross-process exclusion is the
//! persistent store's job.

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// Runs a computation for a key with the guarantee that concurrent
/// callers for the same key serialize
pub trait KeyedGuard<K>: Send + Sync
where
    K: Eq + Hash + Clone,
{
    /// Block until no other computation is in flight for `key`, run
    /// `compute`, and release on any exit.
    fn guard_by_key<T>(&self, key: K, compute: impl FnOnce() -> T) -> T;
}

/// Which guard implementation the cache uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardPolicy {
    /// Serialize through a dedicated per-key lock
    Strict,
    /// Serialize only under observed same-key contention
    #[default]
    Adaptive,
}

/// Guard serializing all callers of a key on that key's own lock
pub struct StrictGuard<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for StrictGuard<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> StrictGuard<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Removes a key's lock entry once the last holder releases it
struct StrictRelease<'a, K: Eq + Hash + Clone> {
    guard: &'a StrictGuard<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for StrictRelease<'_, K> {
    fn drop(&mut self) {
        let mut locks = self.guard.locks.lock();
        if let Some(lock) = locks.get(&self.key) {
            // One reference in the map, one held by the releasing
            // caller. Waiters hold further clones, keeping the entry.
            if Arc::strong_count(lock) == 2 {
                locks.remove(&self.key);
            }
        }
    }
}

impl<K> KeyedGuard<K> for StrictGuard<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn guard_by_key<T>(&self, key: K, compute: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _cleanup = StrictRelease { guard: self, key };
        let _held = lock.lock();
        compute()
    }
}

/// Guard tracking in-flight keys, parking callers only on contention
pub struct AdaptiveGuard<K> {
    in_flight: Mutex<HashSet<K>>,
    released: Condvar,
}

impl<K: Eq + Hash + Clone> Default for AdaptiveGuard<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> AdaptiveGuard<K> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Removes the in-flight marker and wakes waiters on any exit
struct AdaptiveRelease<'a, K: Eq + Hash + Clone> {
    guard: &'a AdaptiveGuard<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for AdaptiveRelease<'_, K> {
    fn drop(&mut self) {
        self.guard.in_flight.lock().remove(&self.key);
        self.guard.released.notify_all();
    }
}

impl<K> KeyedGuard<K> for AdaptiveGuard<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn guard_by_key<T>(&self, key: K, compute: impl FnOnce() -> T) -> T {
        {
            let mut in_flight = self.in_flight.lock();
            while in_flight.contains(&key) {
                self.released.wait(&mut in_flight);
            }
            in_flight.insert(key.clone());
        }
        let _cleanup = AdaptiveRelease { guard: self, key };
        compute()
    }
}

/// Policy-selected guard
pub enum Guard<K> {
    Strict(StrictGuard<K>),
    Adaptive(AdaptiveGuard<K>),
}

impl<K: Eq + Hash + Clone> Guard<K> {
    pub fn new(policy: GuardPolicy) -> Self {
        match policy {
            GuardPolicy::Strict => Self::Strict(StrictGuard::new()),
            GuardPolicy::Adaptive => Self::Adaptive(AdaptiveGuard::new()),
        }
    }
}

impl<K> KeyedGuard<K> for Guard<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    fn guard_by_key<T>(&self, key: K, compute: impl FnOnce() -> T) -> T {
        match self {
            Self::Strict(guard) => guard.guard_by_key(key, compute),
            Self::Adaptive(guard) => guard.guard_by_key(key, compute),
        }
    }
}
