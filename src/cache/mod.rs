//! Cache module - bounded, policy-driven caching for repositories.
//!
//! ## Architecture
//!
//! - `CacheStore` - bounded keyed map guarded by its own mutex
//! - `EvictionPolicy` - LRU, LFU or pass-through bookkeeping chosen at startup
//! - `CacheRegistry` - one named store per cached resource
//! - `CachedRepository` - decorator adding read-through / write-through
//!   caching to any `Repository`
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = CacheRegistry::new(CacheConfig::new(PolicyKind::Lru, 100));
//! let houses = CachedRepository::new(MongoRepository::new(&db, "houses"), &registry, "houses")?;
//!
//! // Second call is served from the cache.
//! houses.find_by_key(uuid).await?;
//! houses.find_by_key(uuid).await?;
//! ```

mod config;
mod interceptor;
mod lfu;
mod lru;
mod policy;
mod registry;
mod store;

use std::hash::Hash;

use thiserror::Error;

pub use config::{CacheConfig, PolicyKind};
pub use interceptor::CachedRepository;
pub use registry::CacheRegistry;
pub use store::CacheStats;

/// A cacheable payload with a stable unique key.
pub trait Identifiable {
    type Key: Hash + Eq + Clone + Send + Sync + 'static;

    fn key(&self) -> Self::Key;
}

/// Errors raised while configuring or wiring caches.
///
/// Cache operations themselves never fail.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Policy name not recognised
    #[error("unknown cache policy '{0}' (expected none, lru or lfu)")]
    UnknownPolicy(String),

    /// Store name reused with different key/value types
    #[error("cache '{name}' already exists as {found}, requested {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}
