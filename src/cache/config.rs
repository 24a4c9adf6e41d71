//! Cache configuration.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::CacheError;

/// Eviction discipline of a cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Pass-through: nothing is ever stored.
    None,
    /// Least recently used.
    Lru,
    /// Least frequently used, oldest insert first among ties.
    #[default]
    Lfu,
}

impl FromStr for PolicyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            _ => Err(CacheError::UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Lru => "lru",
            Self::Lfu => "lfu",
        };
        f.write_str(name)
    }
}

/// Configuration shared by every cache store of the service.
///
/// Read once at startup; stores never re-read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false, repositories are not wrapped by the cache at all.
    pub enabled: bool,

    /// Eviction discipline.
    pub policy: PolicyKind,

    /// Maximum number of resident entries per store.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: PolicyKind::Lfu,
            capacity: 100,
        }
    }
}

impl CacheConfig {
    /// Enabled config with the given policy and capacity.
    pub fn new(policy: PolicyKind, capacity: usize) -> Self {
        Self {
            enabled: true,
            policy,
            capacity,
        }
    }

    /// Config that bypasses caching entirely.
    #[allow(dead_code)]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            policy: PolicyKind::None,
            capacity: 0,
        }
    }

    /// Set capacity (builder pattern).
    #[must_use]
    #[allow(dead_code)]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set policy (builder pattern).
    #[must_use]
    #[allow(dead_code)]
    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Capacity a store actually gets. `None` policy always means zero.
    pub fn effective_capacity(&self) -> usize {
        match self.policy {
            PolicyKind::None => 0,
            _ => self.capacity,
        }
    }
}
