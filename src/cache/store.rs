//! Bounded cache store.
//!
//! A `CacheStore` owns its entries, its eviction policy bookkeeping and its
//! counters behind one mutex. The mutex is never held across an `.await`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::config::{CacheConfig, PolicyKind};
use super::policy::{self, EvictionPolicy};

/// Snapshot of a store's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub policy: PolicyKind,
    pub capacity: usize,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub removals: u64,
}

/// Proof of a miss on one key, taken before fetching the authoritative value.
///
/// Redeemed with [`FillTicket::fill`], which refuses the value if the same key
/// was written, or the store cleared, in between. Dropping an unredeemed
/// ticket releases it.
#[derive(Debug)]
#[must_use]
pub struct FillTicket<'a, K: Hash + Eq, V> {
    store: &'a CacheStore<K, V>,
    key: Option<K>,
    issued: u64,
}

/// Result of [`CacheStore::lookup`].
#[derive(Debug)]
pub enum Lookup<'a, K: Hash + Eq, V> {
    Hit(V),
    Miss(FillTicket<'a, K, V>),
}

/// Outstanding tickets of one key.
#[derive(Debug, Clone, Copy)]
struct Pending {
    tickets: usize,
    /// Write clock of the key's latest write while tickets were out.
    written: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, V>,
    policy: Box<dyn EvictionPolicy<K>>,
    /// Write clock, advanced by every put/remove/clear.
    clock: u64,
    /// Clock value of the latest clear.
    cleared: u64,
    /// Keys with tickets out. Only these keys record their writes.
    pending: HashMap<K, Pending>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V> Inner<K, V> {
    /// Record a write to `key`.
    fn touch(&mut self, key: &K) {
        self.clock += 1;
        if let Some(pending) = self.pending.get_mut(key) {
            pending.written = self.clock;
        }
    }

    /// Drop one ticket of `key`, returning the key's latest write clock.
    fn release(&mut self, key: &K) -> u64 {
        let Some(pending) = self.pending.get_mut(key) else {
            return 0;
        };

        let written = pending.written;
        pending.tickets -= 1;
        if pending.tickets == 0 {
            self.pending.remove(key);
        }
        written
    }
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone,
{
    fn read(&mut self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        match self.entries.get(key) {
            Some(value) => {
                let value = value.clone();
                self.policy.on_access(key);
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a key that is not resident, evicting first when full.
    fn admit(&mut self, name: &str, capacity: usize, key: K, value: V) {
        if self.entries.len() >= capacity
            && let Some(victim) = self.policy.evict()
        {
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            debug!("Cache '{}' evicted an entry ({} resident)", name, self.entries.len());
        }

        self.policy.on_insert(&key);
        self.entries.insert(key, value);
        self.stats.insertions += 1;
    }
}

/// Bounded keyed map with a pluggable eviction policy.
pub struct CacheStore<K, V> {
    name: Arc<str>,
    kind: PolicyKind,
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> CacheStore<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a store. A `None` policy yields a store that never holds entries.
    pub fn new(name: impl Into<Arc<str>>, kind: PolicyKind, capacity: usize) -> Self {
        let capacity = match kind {
            PolicyKind::None => 0,
            _ => capacity,
        };

        Self {
            name: name.into(),
            kind,
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                policy: policy::build(kind),
                clock: 0,
                cleared: 0,
                pending: HashMap::new(),
                stats: CacheStats {
                    policy: kind,
                    capacity,
                    ..CacheStats::default()
                },
            }),
        }
    }

    /// Create a store from the shared configuration.
    pub fn from_config(name: impl Into<Arc<str>>, config: &CacheConfig) -> Self {
        Self::new(name, config.policy, config.effective_capacity())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[allow(dead_code)]
    pub fn policy(&self) -> PolicyKind {
        self.kind
    }

    #[allow(dead_code)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a value, counting the read as an access.
    #[allow(dead_code)]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().read(key)
    }

    /// Like [`get`](Self::get), but a miss hands out a ticket for
    /// [`FillTicket::fill`].
    pub fn lookup(&self, key: &K) -> Lookup<'_, K, V> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.read(key) {
            return Lookup::Hit(value);
        }

        inner
            .pending
            .entry(key.clone())
            .or_insert(Pending {
                tickets: 0,
                written: 0,
            })
            .tickets += 1;

        Lookup::Miss(FillTicket {
            store: self,
            key: Some(key.clone()),
            issued: inner.clock,
        })
    }

    /// Insert-if-absent for a redeemed ticket.
    fn fill(&self, key: K, value: V, issued: u64) -> bool {
        let mut inner = self.inner.lock();
        let written = inner.release(&key);

        if self.capacity == 0
            || written > issued
            || inner.cleared > issued
            || inner.entries.contains_key(&key)
        {
            return false;
        }

        inner.admit(&self.name, self.capacity, key, value);
        true
    }

    /// Insert or replace a value. Replacing counts as an access.
    pub fn put(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        inner.touch(&key);

        if let Some(slot) = inner.entries.get_mut(&key) {
            *slot = value;
            inner.policy.on_access(&key);
            return;
        }

        inner.admit(&self.name, self.capacity, key, value);
    }

    /// Remove a key. Returns whether it was resident.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        inner.touch(key);

        if inner.entries.remove(key).is_some() {
            inner.policy.on_remove(key);
            inner.stats.removals += 1;
            true
        } else {
            false
        }
    }

    /// Whether a key is resident. Does not count as an access.
    #[allow(dead_code)]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Exact number of resident entries.
    #[allow(dead_code)]
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Drop every entry and all policy bookkeeping.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        inner.cleared = inner.clock;
        inner.entries.clear();
        inner.policy.clear();
        debug!("Cache '{}' cleared", self.name);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            ..inner.stats
        }
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let inner = self.inner.lock();
        assert!(inner.entries.len() <= self.capacity);
        assert_eq!(inner.entries.len(), inner.policy.len());
        for key in inner.entries.keys() {
            assert!(inner.policy.contains(key));
        }
    }
}

impl<K, V> FillTicket<'_, K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Populate the missed key.
    ///
    /// Inserts only if the key is still absent and neither a write to this key
    /// nor a clear happened since the ticket was issued. Writes to other keys
    /// do not matter. Returns whether the value was stored.
    pub fn fill(mut self, value: V) -> bool {
        match self.key.take() {
            Some(key) => self.store.fill(key, value, self.issued),
            None => false,
        }
    }
}

impl<K: Hash + Eq, V> Drop for FillTicket<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.store.inner.lock().release(&key);
        }
    }
}

/// Type-erased view of a store, used by the registry for administration.
pub trait CacheMonitor: Send + Sync {
    fn name(&self) -> &str;
    fn stats(&self) -> CacheStats;
    fn clear(&self);
}

impl<K, V> CacheMonitor for CacheStore<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn name(&self) -> &str {
        CacheStore::name(self)
    }

    fn stats(&self) -> CacheStats {
        CacheStore::stats(self)
    }

    fn clear(&self) {
        CacheStore::clear(self);
    }
}

impl<K, V> std::fmt::Debug for CacheStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("policy", &self.kind)
            .field("capacity", &self.capacity)
            .field("size", &self.inner.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    fn lru(capacity: usize) -> CacheStore<&'static str, u32> {
        CacheStore::new("test", PolicyKind::Lru, capacity)
    }

    fn lfu(capacity: usize) -> CacheStore<&'static str, u32> {
        CacheStore::new("test", PolicyKind::Lfu, capacity)
    }

    #[test]
    fn test_put_get_replace() {
        let store = lru(4);
        store.put("a", 1);
        store.put("a", 2);

        assert_eq!(store.size(), 1);
        assert_eq!(store.get(&"a"), Some(2));
        assert_eq!(store.get(&"b"), None);
        store.assert_consistent();
    }

    #[test]
    fn test_lru_evicts_first_inserted() {
        let store = lru(3);
        for (i, key) in ["a", "b", "c", "d"].into_iter().enumerate() {
            store.put(key, i as u32);
        }

        assert_eq!(store.size(), 3);
        assert!(!store.contains(&"a"));
        assert!(store.contains(&"d"));
        store.assert_consistent();
    }

    #[test]
    fn test_lru_get_protects_entry() {
        let store = lru(2);
        store.put("a", 1);
        store.put("b", 2);
        assert_eq!(store.get(&"a"), Some(1));
        store.put("c", 3);

        assert!(store.contains(&"a"));
        assert!(!store.contains(&"b"));
        assert!(store.contains(&"c"));
        assert_eq!(store.size(), 2);
    }

    #[test]
    fn test_lru_put_on_existing_key_refreshes_recency() {
        let store = lru(2);
        store.put("a", 1);
        store.put("b", 2);
        store.put("a", 10);
        store.put("c", 3);

        assert_eq!(store.get(&"a"), Some(10));
        assert!(!store.contains(&"b"));
    }

    #[test]
    fn test_lfu_keeps_frequently_read_key() {
        let store = lfu(3);
        store.put("a", 1);
        store.put("b", 2);
        store.put("k", 3);
        for _ in 0..4 {
            store.get(&"k");
        }
        store.put("d", 4);

        // a and b tie at the minimum; a was inserted first.
        assert!(!store.contains(&"a"));
        assert!(store.contains(&"b"));
        assert!(store.contains(&"k"));
        assert!(store.contains(&"d"));
        store.assert_consistent();
    }

    #[test]
    fn test_lfu_put_on_existing_key_counts_as_access() {
        let store = lfu(2);
        store.put("a", 1);
        store.put("b", 2);
        store.put("a", 11);
        store.put("c", 3);

        assert!(store.contains(&"a"));
        assert!(!store.contains(&"b"));
    }

    #[test]
    fn test_zero_capacity_is_noop() {
        let store = lru(0);
        store.put("a", 1);

        assert_eq!(store.size(), 0);
        assert_eq!(store.get(&"a"), None);
        assert!(matches!(store.lookup(&"a"), Lookup::Miss(_)));
    }

    #[test]
    fn test_none_policy_ignores_capacity() {
        let store: CacheStore<&str, u32> = CacheStore::new("none", PolicyKind::None, 10);
        store.put("a", 1);

        assert_eq!(store.capacity(), 0);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = lfu(4);
        store.put("a", 1);
        store.put("b", 2);

        assert!(store.remove(&"a"));
        assert!(!store.remove(&"a"));
        assert_eq!(store.size(), 1);

        store.clear();
        assert_eq!(store.size(), 0);
        store.assert_consistent();
    }

    #[test]
    fn test_fill_after_miss() {
        let store = lru(2);
        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };

        assert!(ticket.fill(1));
        assert!(matches!(store.lookup(&"a"), Lookup::Hit(1)));
        assert!(store.inner.lock().pending.is_empty());
    }

    #[test]
    fn test_fill_rejected_after_write() {
        let store = lru(2);
        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        store.remove(&"a");

        assert!(!ticket.fill(1));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_fill_survives_writes_to_other_keys() {
        let store = lru(4);
        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        store.put("b", 2);
        store.remove(&"c");

        assert!(ticket.fill(1));
        assert_eq!(store.get(&"a"), Some(1));
        assert_eq!(store.get(&"b"), Some(2));
    }

    #[test]
    fn test_fill_rejected_after_put_or_clear() {
        let store = lru(4);

        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        store.put("a", 2);
        store.remove(&"a");
        assert!(!ticket.fill(1));

        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        store.clear();
        assert!(!ticket.fill(1));
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_write_before_lookup_does_not_block_fill() {
        let store = lru(4);
        store.put("a", 1);
        store.remove(&"a");

        let Lookup::Miss(ticket) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        assert!(ticket.fill(3));
        assert_eq!(store.get(&"a"), Some(3));
    }

    #[test]
    fn test_dropped_ticket_is_released() {
        let store = lru(4);
        let Lookup::Miss(first) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        let Lookup::Miss(second) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        assert_eq!(store.inner.lock().pending.get(&"a").map(|p| p.tickets), Some(2));

        drop(first);
        store.put("a", 5);
        assert!(!second.fill(1));

        assert!(store.inner.lock().pending.is_empty());
        assert_eq!(store.get(&"a"), Some(5));
    }

    #[test]
    fn test_fill_does_not_overwrite_resident_value() {
        let store = lru(2);
        let Lookup::Miss(first) = store.lookup(&"a") else {
            panic!("expected a miss");
        };
        let Lookup::Miss(second) = store.lookup(&"a") else {
            panic!("expected a miss");
        };

        assert!(first.fill(1));
        assert!(!second.fill(2));
        assert_eq!(store.get(&"a"), Some(1));
    }

    #[test]
    fn test_stats_track_operations() {
        let store = lru(1);
        store.put("a", 1);
        store.get(&"a");
        store.get(&"x");
        store.put("b", 2);
        store.remove(&"b");

        let stats = store.stats();
        assert_eq!(stats.policy, PolicyKind::Lru);
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.removals, 1);
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let store = Arc::new(CacheStore::<u32, u32>::new("shared", PolicyKind::Lfu, 16));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = (t * 1000 + i) % 64;
                        store.put(key, i);
                        store.get(&((key + 1) % 64));
                        if i % 7 == 0 {
                            store.remove(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.size() <= 16);
        store.assert_consistent();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u32),
        Get(u8),
        Remove(u8),
        Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            4 => (0u8..16).prop_map(Op::Get),
            2 => (0u8..16).prop_map(Op::Remove),
            1 => Just(Op::Clear),
        ]
    }

    fn policy_kind() -> impl Strategy<Value = PolicyKind> {
        prop_oneof![Just(PolicyKind::None), Just(PolicyKind::Lru), Just(PolicyKind::Lfu)]
    }

    proptest! {
        #[test]
        fn prop_store_stays_bounded_and_consistent(
            kind in policy_kind(),
            capacity in 0usize..8,
            ops in proptest::collection::vec(op(), 0..200),
        ) {
            let store = CacheStore::<u8, u32>::new("prop", kind, capacity);
            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        store.put(k, v);
                        if store.capacity() > 0 {
                            prop_assert_eq!(store.get(&k), Some(v));
                        }
                    }
                    Op::Get(k) => {
                        store.get(&k);
                    }
                    Op::Remove(k) => {
                        store.remove(&k);
                        prop_assert!(!store.contains(&k));
                    }
                    Op::Clear => store.clear(),
                }
                prop_assert!(store.size() <= store.capacity());
                store.assert_consistent();
            }
        }
    }
}
