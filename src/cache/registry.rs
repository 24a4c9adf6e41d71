//! Cache registry - Central management for all caches.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::store::{CacheMonitor, CacheStats, CacheStore};
use super::{CacheConfig, CacheError};

/// Central registry owning one named store per cached resource.
///
/// Every store is built from the registry's configuration and has its own
/// lock, so traffic on one resource never contends with another.
///
/// ## Example
///
/// ```rust,ignore
/// let registry = CacheRegistry::new(CacheConfig::new(PolicyKind::Lru, 100));
/// let houses: Arc<CacheStore<Uuid, House>> = registry.get_or_create("houses")?;
/// ```
#[derive(Clone)]
pub struct CacheRegistry {
    config: CacheConfig,
    caches: Arc<RwLock<BTreeMap<String, CacheEntry>>>,
}

/// Internal registry entry storing a type-erased store.
struct CacheEntry {
    cache: Arc<dyn Any + Send + Sync>,
    monitor: Arc<dyn CacheMonitor>,
    type_id: TypeId,
    type_name: &'static str,
}

impl CacheRegistry {
    /// Create a new empty registry for the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        info!(
            "Cache registry initialized (enabled: {}, policy: {}, capacity: {})",
            config.enabled, config.policy, config.capacity
        );
        Self {
            config,
            caches: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Whether repositories should be wrapped by a cache at all.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the store registered under `name`, creating it if needed.
    ///
    /// # Errors
    /// Returns [`CacheError::TypeMismatch`] if `name` is already registered
    /// with different key/value types.
    pub fn get_or_create<K, V>(&self, name: &str) -> Result<Arc<CacheStore<K, V>>, CacheError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        if let Some(cache) = self.get(name)? {
            return Ok(cache);
        }

        let mut caches = self.caches.write();

        // Another caller may have won the race between the read and write lock.
        if let Some(existing) = caches.get(name) {
            return Self::downcast(name, existing);
        }

        debug!("Creating cache: {}", name);

        let cache = Arc::new(CacheStore::<K, V>::from_config(name, &self.config));
        caches.insert(
            name.to_string(),
            CacheEntry {
                cache: Arc::clone(&cache) as Arc<dyn Any + Send + Sync>,
                monitor: Arc::clone(&cache) as Arc<dyn CacheMonitor>,
                type_id: TypeId::of::<CacheStore<K, V>>(),
                type_name: std::any::type_name::<CacheStore<K, V>>(),
            },
        );

        Ok(cache)
    }

    /// Get an existing store by name.
    ///
    /// # Errors
    /// Returns [`CacheError::TypeMismatch`] if the store exists with other types.
    pub fn get<K, V>(&self, name: &str) -> Result<Option<Arc<CacheStore<K, V>>>, CacheError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let caches = self.caches.read();
        caches
            .get(name)
            .map(|entry| Self::downcast(name, entry))
            .transpose()
    }

    fn downcast<K, V>(name: &str, entry: &CacheEntry) -> Result<Arc<CacheStore<K, V>>, CacheError>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mismatch = || CacheError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<CacheStore<K, V>>(),
            found: entry.type_name,
        };

        if entry.type_id != TypeId::of::<CacheStore<K, V>>() {
            return Err(mismatch());
        }

        Arc::clone(&entry.cache)
            .downcast::<CacheStore<K, V>>()
            .map_err(|_| mismatch())
    }

    /// Check if a store with the given name exists.
    #[allow(dead_code)]
    pub fn contains(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Stats of every registered store, ordered by name.
    pub fn stats(&self) -> Vec<(String, CacheStats)> {
        self.caches
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.monitor.stats()))
            .collect()
    }

    /// Clear every registered store.
    pub fn clear_all(&self) {
        for entry in self.caches.read().values() {
            debug!("Clearing cache: {}", entry.monitor.name());
            entry.monitor.clear();
        }
        info!("All caches cleared");
    }

    /// Get a list of all registered cache names.
    #[allow(dead_code)]
    pub fn cache_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("config", &self.config)
            .field("cache_names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PolicyKind;

    #[test]
    fn test_get_or_create_returns_shared_store() {
        let registry = CacheRegistry::new(CacheConfig::new(PolicyKind::Lru, 4));

        let first = registry.get_or_create::<u32, String>("houses").unwrap();
        first.put(1, "one".to_string());
        let second = registry.get_or_create::<u32, String>("houses").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get(&1), Some("one".to_string()));
        assert_eq!(second.capacity(), 4);
        assert_eq!(second.policy(), PolicyKind::Lru);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let registry = CacheRegistry::default();
        registry.get_or_create::<u32, String>("people").unwrap();

        let result = registry.get_or_create::<u64, String>("people");
        assert!(matches!(result, Err(CacheError::TypeMismatch { name, .. }) if name == "people"));
    }

    #[test]
    fn test_stores_are_independent() {
        let registry = CacheRegistry::new(CacheConfig::new(PolicyKind::Lfu, 1));
        let houses = registry.get_or_create::<u32, u32>("houses").unwrap();
        let people = registry.get_or_create::<u32, u32>("people").unwrap();

        houses.put(1, 1);
        people.put(1, 2);
        people.put(2, 3);

        assert_eq!(houses.get(&1), Some(1));
        assert_eq!(people.size(), 1);
        assert_eq!(registry.cache_names(), vec!["houses", "people"]);
        assert!(registry.contains("houses"));
        assert!(!registry.contains("streets"));
    }

    #[test]
    fn test_stats_and_clear_all() {
        let registry = CacheRegistry::new(CacheConfig::new(PolicyKind::Lru, 8));
        let houses = registry.get_or_create::<u32, u32>("houses").unwrap();
        houses.put(1, 1);
        houses.put(2, 2);

        let stats = registry.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, "houses");
        assert_eq!(stats[0].1.size, 2);

        registry.clear_all();
        assert_eq!(houses.size(), 0);
    }
}
