//! `GET /houses/:uuid/residents` - people living in a house.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use super::error::ApiError;
use crate::database::{Page, Person, Residents};

pub fn routes(residents: Arc<dyn Residents>) -> Router {
    Router::new()
        .route("/houses/:uuid/residents", get(list))
        .with_state(residents)
}

/// An unknown house answers with an empty list.
async fn list(
    State(residents): State<Arc<dyn Residents>>,
    Path(house): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Person>>, ApiError> {
    Ok(Json(residents.find_residents(house, page.normalized()).await?))
}
