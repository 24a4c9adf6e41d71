//! Cache administration routes.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::cache::{CacheRegistry, CacheStats};

pub fn routes(registry: CacheRegistry) -> Router {
    Router::new()
        .route("/cache/stats", get(stats))
        .route("/cache", delete(clear))
        .with_state(registry)
}

/// Per-store statistics keyed by store name.
async fn stats(State(registry): State<CacheRegistry>) -> Json<BTreeMap<String, CacheStats>> {
    Json(registry.stats().into_iter().collect())
}

async fn clear(State(registry): State<CacheRegistry>) -> StatusCode {
    registry.clear_all();
    StatusCode::NO_CONTENT
}
