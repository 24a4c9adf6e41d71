//! Least-frequently-used bookkeeping.
//!
//! A new key starts at frequency 1 and every access adds one. Keys are ordered
//! by `(frequency, insertion sequence)`, so the victim is the least used key
//! and, among equally used keys, the one inserted first.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use super::policy::EvictionPolicy;

/// Frequency a key starts with when it enters the cache.
pub const INITIAL_FREQUENCY: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Rank {
    frequency: u64,
    sequence: u64,
}

/// LFU ordering with oldest-inserted tie-break.
#[derive(Debug)]
pub struct LfuPolicy<K> {
    ranks: HashMap<K, Rank>,
    order: BTreeMap<Rank, K>,
    next_sequence: u64,
}

impl<K> Default for LfuPolicy<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LfuPolicy<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            ranks: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Current access count of a tracked key.
    #[allow(dead_code)]
    pub fn frequency(&self, key: &K) -> Option<u64> {
        self.ranks.get(key).map(|rank| rank.frequency)
    }
}

impl<K> EvictionPolicy<K> for LfuPolicy<K>
where
    K: Hash + Eq + Clone + Send,
{
    fn on_insert(&mut self, key: &K) {
        if self.ranks.contains_key(key) {
            self.on_access(key);
            return;
        }

        let rank = Rank {
            frequency: INITIAL_FREQUENCY,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        self.ranks.insert(key.clone(), rank);
        self.order.insert(rank, key.clone());
    }

    fn on_access(&mut self, key: &K) {
        let Some(rank) = self.ranks.get_mut(key) else {
            return;
        };

        let old = *rank;
        rank.frequency = rank.frequency.saturating_add(1);
        let new = *rank;

        if let Some(k) = self.order.remove(&old) {
            self.order.insert(new, k);
        }
    }

    fn on_remove(&mut self, key: &K) {
        if let Some(rank) = self.ranks.remove(key) {
            self.order.remove(&rank);
        }
    }

    fn evict(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ranks.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.ranks.clear();
        self.order.clear();
    }

    fn contains(&self, key: &K) -> bool {
        self.ranks.contains_key(key)
    }

    fn len(&self) -> usize {
        self.ranks.len()
    }
}
