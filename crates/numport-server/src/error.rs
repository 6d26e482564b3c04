//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use numport_common::NumportError;
use numport_ingest::IngestError;
use serde_json::json;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("{0}")]
    Numport(#[from] NumportError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Conflict(ref message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
            AppError::Ingest(IngestError::SourceNotFound(ref path)) => (
                StatusCode::NOT_FOUND,
                format!("Source file not found: {}", path.display()),
            ),
            AppError::Ingest(IngestError::Config(ref message)) => {
                (StatusCode::BAD_REQUEST, message.clone())
            },
            AppError::Ingest(ref e) => {
                tracing::error!("Ingest error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An import error occurred".to_string())
            },
            AppError::Numport(NumportError::InvalidPhoneNumber { .. }) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            },
            AppError::Numport(ref e) => {
                tracing::error!("Numport error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
