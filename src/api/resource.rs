//! CRUD routes shared by every stored resource.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::error::ApiError;
use crate::cache::Identifiable;
use crate::database::{Page, Repository};

/// Shared handle to a (possibly cached) repository.
pub type SharedRepository<E, Q> = Arc<dyn Repository<Entity = E, Request = Q>>;

/// Handler state for one resource.
struct ResourceState<E, Q> {
    kind: &'static str,
    repository: SharedRepository<E, Q>,
}

impl<E, Q> Clone for ResourceState<E, Q> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            repository: Arc::clone(&self.repository),
        }
    }
}

/// Build the five CRUD routes for a resource mounted at `path`.
///
/// `kind` names the entity in error messages.
pub fn routes<E, Q>(path: &str, kind: &'static str, repository: SharedRepository<E, Q>) -> Router
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    Router::new()
        .route(path, get(list::<E, Q>).post(create::<E, Q>))
        .route(
            &format!("{path}/:uuid"),
            get(find::<E, Q>).put(update::<E, Q>).delete(remove::<E, Q>),
        )
        .with_state(ResourceState { kind, repository })
}

async fn find<E, Q>(
    State(state): State<ResourceState<E, Q>>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<E>, ApiError>
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    state
        .repository
        .find_by_key(uuid)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            kind: state.kind,
            uuid,
        })
}

async fn list<E, Q>(
    State(state): State<ResourceState<E, Q>>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<E>>, ApiError>
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    Ok(Json(state.repository.find_all(page.normalized()).await?))
}

async fn create<E, Q>(
    State(state): State<ResourceState<E, Q>>,
    Json(request): Json<Q>,
) -> Result<(StatusCode, Json<E>), ApiError>
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    let created = state.repository.create(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update<E, Q>(
    State(state): State<ResourceState<E, Q>>,
    Path(uuid): Path<Uuid>,
    Json(request): Json<Q>,
) -> Result<Json<E>, ApiError>
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    state
        .repository
        .update(request, uuid)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            kind: state.kind,
            uuid,
        })
}

async fn remove<E, Q>(
    State(state): State<ResourceState<E, Q>>,
    Path(uuid): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
    E: Identifiable<Key = Uuid> + Clone + Serialize + Send + Sync + 'static,
    Q: DeserializeOwned + Send + 'static,
{
    state.repository.delete(uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
