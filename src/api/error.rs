//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::database::RepositoryError;

/// Errors a handler can return.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{kind} with uuid {uuid} not found")]
    NotFound { kind: &'static str, uuid: uuid::Uuid },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorBody {
            error_message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
