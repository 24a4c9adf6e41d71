//! REST API.
//!
//! - `/houses`, `/people` - CRUD over the (cached) repositories
//! - `/houses/:uuid/residents` - people living in a house
//! - `/cache` - cache statistics and flushing

mod cache;
mod error;
mod residents;
mod resource;

use std::sync::Arc;

use axum::Router;

use resource::SharedRepository;

use crate::cache::CacheRegistry;
use crate::database::{House, HouseRequest, Person, PersonRequest, Residents};

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppState {
    pub houses: SharedRepository<House, HouseRequest>,
    pub people: SharedRepository<Person, PersonRequest>,
    /// Same repository as `people`, seen through its residents lookup.
    pub residents: Arc<dyn Residents>,
    pub registry: CacheRegistry,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(resource::routes("/houses", "House", state.houses))
        .merge(resource::routes("/people", "Person", state.people))
        .merge(residents::routes(state.residents))
        .merge(cache::routes(state.registry))
}
