//! Caching decorator for repositories.
//!
//! `CachedRepository` wraps any [`Repository`] and implements the same trait:
//! reads go through the cache first, successful writes are reflected in it.
//! Collaborator errors are returned untouched and never change the cache.
//!
//! The store's mutex is only held inside store calls, never across the
//! collaborator's I/O. Two mechanisms keep the cache coherent anyway:
//! - reads fill the cache with a [`FillTicket`](super::store::FillTicket), which
//!   is refused if the same key was written during the fetch;
//! - updates and deletes of one key are serialized by a per-key write gate, so
//!   their cache writes land in the same order as their collaborator writes.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::store::{CacheStore, Lookup};
use super::{CacheError, CacheRegistry, Identifiable};
use crate::database::{KeyOf, Page, Person, Repository, RepositoryError, Residents};

/// Store type used to cache a repository's entities.
pub type StoreOf<R> = CacheStore<KeyOf<R>, <R as Repository>::Entity>;

/// Read-through / write-through cache in front of a repository.
pub struct CachedRepository<R: Repository> {
    inner: R,
    cache: Option<Arc<StoreOf<R>>>,
    gates: DashMap<KeyOf<R>, Arc<Mutex<()>>>,
}

/// A key's write gate, removed from the map once nobody holds or awaits it.
struct Gate<'a, K: Hash + Eq> {
    gates: &'a DashMap<K, Arc<Mutex<()>>>,
    key: K,
    gate: Arc<Mutex<()>>,
}

impl<'a, K: Hash + Eq + Clone> Gate<'a, K> {
    fn new(gates: &'a DashMap<K, Arc<Mutex<()>>>, key: &K) -> Self {
        let gate = Arc::clone(gates.entry(key.clone()).or_default().value());
        Self {
            gates,
            key: key.clone(),
            gate,
        }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl<K: Hash + Eq> Drop for Gate<'_, K> {
    fn drop(&mut self) {
        // One reference is the map's, one is ours.
        self.gates
            .remove_if(&self.key, |_, gate| Arc::strong_count(gate) <= 2);
    }
}

impl<R: Repository> CachedRepository<R> {
    /// Wrap `inner` with the registry's store named `name`.
    ///
    /// When caching is disabled the repository is wrapped without a store and
    /// every call goes straight to `inner`.
    ///
    /// # Errors
    /// Returns [`CacheError::TypeMismatch`] if `name` is registered for
    /// another entity type.
    pub fn new(inner: R, registry: &CacheRegistry, name: &str) -> Result<Self, CacheError> {
        let cache = if registry.enabled() {
            Some(registry.get_or_create(name)?)
        } else {
            debug!("Caching disabled, '{}' repository is not cached", name);
            None
        };

        Ok(Self {
            inner,
            cache,
            gates: DashMap::new(),
        })
    }

    /// Wrap `inner` without caching.
    #[allow(dead_code)]
    pub fn uncached(inner: R) -> Self {
        Self {
            inner,
            cache: None,
            gates: DashMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn inner(&self) -> &R {
        &self.inner
    }

    #[allow(dead_code)]
    pub fn cache(&self) -> Option<&Arc<StoreOf<R>>> {
        self.cache.as_ref()
    }
}

#[async_trait]
impl<R: Repository> Repository for CachedRepository<R> {
    type Entity = R::Entity;
    type Request = R::Request;

    async fn find_by_key(&self, key: KeyOf<R>) -> Result<Option<R::Entity>, RepositoryError> {
        let Some(cache) = &self.cache else {
            return self.inner.find_by_key(key).await;
        };

        let ticket = match cache.lookup(&key) {
            Lookup::Hit(entity) => {
                debug!("Cache '{}' hit", cache.name());
                return Ok(Some(entity));
            }
            Lookup::Miss(ticket) => ticket,
        };

        debug!("Cache '{}' miss, reading through", cache.name());
        let found = self.inner.find_by_key(key).await?;

        // Negative results are not cached; the dropped ticket is released.
        if let Some(entity) = &found
            && !ticket.fill(entity.clone())
        {
            debug!("Cache '{}' skipped a fill raced by a write", cache.name());
        }

        Ok(found)
    }

    async fn find_all(&self, page: Page) -> Result<Vec<R::Entity>, RepositoryError> {
        self.inner.find_all(page).await
    }

    async fn create(&self, request: R::Request) -> Result<R::Entity, RepositoryError> {
        let created = self.inner.create(request).await?;

        if let Some(cache) = &self.cache {
            cache.put(created.key(), created.clone());
        }

        Ok(created)
    }

    async fn update(
        &self,
        request: R::Request,
        key: KeyOf<R>,
    ) -> Result<Option<R::Entity>, RepositoryError> {
        let Some(cache) = &self.cache else {
            return self.inner.update(request, key).await;
        };

        let gate = Gate::new(&self.gates, &key);
        let _held = gate.lock().await;
        let updated = self.inner.update(request, key.clone()).await?;

        if let Some(entity) = &updated {
            cache.put(key, entity.clone());
        }

        Ok(updated)
    }

    async fn delete(&self, key: KeyOf<R>) -> Result<u64, RepositoryError> {
        let Some(cache) = &self.cache else {
            return self.inner.delete(key).await;
        };

        let gate = Gate::new(&self.gates, &key);
        let _held = gate.lock().await;

        // Evict before the delete starts so no reader sees a stale hit.
        cache.remove(&key);
        let deleted = self.inner.delete(key.clone()).await?;

        // A read that overlapped the delete may have filled the key again.
        cache.remove(&key);

        Ok(deleted)
    }
}

/// Resident lists pass through uncached, like `find_all`.
#[async_trait]
impl<R: Repository + Residents> Residents for CachedRepository<R> {
    async fn find_residents(
        &self,
        house: Uuid,
        page: Page,
    ) -> Result<Vec<Person>, RepositoryError> {
        self.inner.find_residents(house, page).await
    }
}

impl<R: Repository> std::fmt::Debug for CachedRepository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
