//! Configuration module for Habitat.
//!
//! Loads configuration from environment variables.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::cache::{CacheConfig, CacheError, PolicyKind};

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_DATABASE: &str = "habitat";

/// Configuration errors, all reported at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be true or false, got '{value}'")]
    InvalidBool { name: &'static str, value: String },

    #[error("CACHE_CAPACITY must be a non-negative integer, got '{0}'")]
    InvalidCapacity(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("unknown storage '{0}' (expected mongo or memory)")]
    UnknownStorage(String),

    #[error("MONGODB_URI must be set when STORAGE is mongo")]
    MissingMongoUri,

    #[error("HTTP_ADDR is not a valid socket address: '{0}'")]
    InvalidAddr(String),
}

/// Where entities are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    Mongo,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownStorage(s.to_string())),
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mongo => f.write_str("mongo"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // HTTP
    pub http_addr: SocketAddr,

    // Storage
    pub storage: StorageKind,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,

    // Cache
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns error if a variable is malformed or a required one is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from any variable source.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache = CacheConfig {
            enabled: match lookup("CACHE_ENABLED") {
                Some(value) => parse_bool("CACHE_ENABLED", &value)?,
                None => true,
            },
            policy: match lookup("CACHE_POLICY") {
                Some(value) => value.parse::<PolicyKind>()?,
                None => PolicyKind::default(),
            },
            capacity: match lookup("CACHE_CAPACITY") {
                Some(value) => value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidCapacity(value))?,
                None => CacheConfig::default().capacity,
            },
        };

        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidAddr(http_addr))?;

        let storage = match lookup("STORAGE") {
            Some(value) => value.parse::<StorageKind>()?,
            None => StorageKind::default(),
        };

        let mongodb_uri = lookup("MONGODB_URI").filter(|uri| !uri.trim().is_empty());

        // Validate the URI is set if storage is mongo
        if storage == StorageKind::Mongo && mongodb_uri.is_none() {
            return Err(ConfigError::MissingMongoUri);
        }

        Ok(Self {
            http_addr,
            storage,
            mongodb_uri,
            mongodb_database: lookup("MONGODB_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            cache,
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("MONGODB_URI", "mongodb://localhost:27017")]).unwrap();

        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.storage, StorageKind::Mongo);
        assert_eq!(config.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.mongodb_database, "habitat");
    }

    #[test]
    fn test_cache_settings() {
        let config = load(&[
            ("STORAGE", "memory"),
            ("CACHE_ENABLED", "FALSE"),
            ("CACHE_POLICY", "Lru"),
            ("CACHE_CAPACITY", "7"),
        ])
        .unwrap();

        assert!(!config.cache.enabled);
        assert_eq!(config.cache.policy, PolicyKind::Lru);
        assert_eq!(config.cache.capacity, 7);
        assert!(config.mongodb_uri.is_none());
    }

    #[test]
    fn test_rejects_bad_values() {
        let memory = ("STORAGE", "memory");

        assert!(matches!(
            load(&[memory, ("CACHE_POLICY", "fifo")]),
            Err(ConfigError::Cache(CacheError::UnknownPolicy(_)))
        ));
        assert!(matches!(
            load(&[memory, ("CACHE_CAPACITY", "-1")]),
            Err(ConfigError::InvalidCapacity(_))
        ));
        assert!(matches!(
            load(&[memory, ("CACHE_ENABLED", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
        assert!(matches!(
            load(&[memory, ("HTTP_ADDR", "localhost")]),
            Err(ConfigError::InvalidAddr(_))
        ));
        assert!(matches!(
            load(&[("STORAGE", "postgres")]),
            Err(ConfigError::UnknownStorage(_))
        ));
    }

    #[test]
    fn test_mongo_requires_uri() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingMongoUri)));
        assert!(matches!(
            load(&[("MONGODB_URI", "  ")]),
            Err(ConfigError::MissingMongoUri)
        ));
    }
}
