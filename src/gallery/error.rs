use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::ingest::IngestError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        match self {
            GalleryError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            GalleryError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
