//! Eviction policy contract and the pass-through policy.

use std::hash::Hash;

use super::config::PolicyKind;
use super::lfu::LfuPolicy;
use super::lru::LruPolicy;

/// Bookkeeping strategy that decides which key leaves a full store.
///
/// The store calls exactly one hook per structural change, so the set of keys
/// a policy tracks is always the set of keys the store holds.
pub trait EvictionPolicy<K>: Send {
    /// A key that was not resident has been inserted.
    fn on_insert(&mut self, key: &K);

    /// A resident key was read or overwritten.
    fn on_access(&mut self, key: &K);

    /// A resident key was removed outside of eviction.
    fn on_remove(&mut self, key: &K);

    /// Pick the next victim and stop tracking it.
    fn evict(&mut self) -> Option<K>;

    /// Forget every tracked key.
    fn clear(&mut self);

    /// Whether a key is tracked.
    fn contains(&self, key: &K) -> bool;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Policy of a disabled store. Tracks nothing.
#[derive(Debug, Default)]
pub struct NoopPolicy;

impl<K> EvictionPolicy<K> for NoopPolicy {
    fn on_insert(&mut self, _key: &K) {}

    fn on_access(&mut self, _key: &K) {}

    fn on_remove(&mut self, _key: &K) {}

    fn evict(&mut self) -> Option<K> {
        None
    }

    fn clear(&mut self) {}

    fn contains(&self, _key: &K) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }
}

/// Build the boxed policy for a configured kind.
pub(crate) fn build<K>(kind: PolicyKind) -> Box<dyn EvictionPolicy<K>>
where
    K: Hash + Eq + Clone + Send + 'static,
{
    match kind {
        PolicyKind::None => Box::new(NoopPolicy),
        PolicyKind::Lru => Box::new(LruPolicy::new()),
        PolicyKind::Lfu => Box::new(LfuPolicy::new()),
    }
}
