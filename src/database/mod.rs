//! Database module exports.

mod memory;
mod models;
mod mongo;
mod repository;

pub use memory::MemoryRepository;
pub use models::*;
pub use mongo::{Database, MongoRepository};
pub use repository::{KeyOf, Page, Repository, RepositoryError, Residents};
