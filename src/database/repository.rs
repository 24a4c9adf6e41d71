//! Repository contract shared by the persistence backends and the cache.
//!
//! Every backend exposes the same five operations; `CachedRepository`
//! implements the trait too, so callers cannot tell the two apart.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use super::models::Person;
use crate::cache::Identifiable;

/// Key type of a repository's entity.
pub type KeyOf<R> = <<R as Repository>::Entity as Identifiable>::Key;

/// Errors returned by persistence backends.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// MongoDB driver error
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Entity could not be turned into a document
    #[error("BSON serialization error: {0}")]
    Serialize(#[from] mongodb::bson::ser::Error),

    /// Stored document could not be read back
    #[error("BSON deserialization error: {0}")]
    Deserialize(#[from] mongodb::bson::de::Error),

    /// Stored or serialized timestamp is not RFC 3339
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    /// Stored date outside the range a timestamp can hold
    #[error("stored date out of range: {0} ms")]
    DateOutOfRange(i64),

    /// Backend cannot serve the request
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Pagination window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Page {
    /// Zero-based page number
    pub page: u64,

    /// Page size, clamped to `MIN_SIZE..=MAX_SIZE`
    pub size: u64,
}

impl Page {
    pub const DEFAULT_SIZE: u64 = 15;
    pub const MIN_SIZE: u64 = 1;
    pub const MAX_SIZE: u64 = 250;

    pub fn new(page: u64, size: u64) -> Self {
        Self {
            page,
            size: size.clamp(Self::MIN_SIZE, Self::MAX_SIZE),
        }
    }

    /// Same window with the size clamped into range.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::new(self.page, self.size)
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 0,
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// CRUD access to one kind of entity.
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: Identifiable + Clone + Send + Sync + 'static;
    type Request: Send + 'static;

    /// Find one entity by key. `None` when it does not exist.
    async fn find_by_key(
        &self,
        key: <Self::Entity as Identifiable>::Key,
    ) -> Result<Option<Self::Entity>, RepositoryError>;

    /// List entities in creation order.
    async fn find_all(&self, page: Page) -> Result<Vec<Self::Entity>, RepositoryError>;

    /// Create an entity; the returned value carries its new key.
    async fn create(&self, request: Self::Request) -> Result<Self::Entity, RepositoryError>;

    /// Update an existing entity. `None` when the key does not exist.
    async fn update(
        &self,
        request: Self::Request,
        key: <Self::Entity as Identifiable>::Key,
    ) -> Result<Option<Self::Entity>, RepositoryError>;

    /// Delete by key, returning the number of deleted entities.
    async fn delete(
        &self,
        key: <Self::Entity as Identifiable>::Key,
    ) -> Result<u64, RepositoryError>;
}

/// People registered as living in a house.
///
/// Results are never cached: any person write could change them.
#[async_trait]
pub trait Residents: Send + Sync {
    /// List the house's residents in creation order. An unknown house has none.
    async fn find_residents(&self, house: Uuid, page: Page) -> Result<Vec<Person>, RepositoryError>;
}
