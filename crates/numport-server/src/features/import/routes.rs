//! Import control routes
//!
//! - `POST /api/v1/import/start` - Start (or resume) the import in the background
//! - `GET /api/v1/import/status` - Status snapshot and progress report
//! - `POST /api/v1/import/cancel` - Stop the local run after its current chunk
//! - `POST /api/v1/import/reset` - Full reset of import state

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use numport_ingest::{ImportController, StartOutcome};
use std::sync::Arc;

use super::commands::{
    CancelImportCommand, ResetImportCommand, StartImportCommand, StartImportError,
};
use super::queries::ImportStatusQuery;
use crate::error::AppError;

pub fn import_routes() -> Router<Arc<ImportController>> {
    Router::new()
        .route("/start", post(start_import))
        .route("/status", get(import_status))
        .route("/cancel", post(cancel_import))
        .route("/reset", post(reset_import))
}

/// Start the import
///
/// The body is optional; `{ "source": "/abs/path.csv" }` overrides the
/// configured source file.
///
/// # Response
///
/// - `202 Accepted` - `{"status":"started"}`
/// - `200 OK` - `{"status":"already_running"}` or `{"status":"already_complete"}`
/// - `400 Bad Request` - Relative source path
#[tracing::instrument(skip(controller, command))]
async fn start_import(
    State(controller): State<Arc<ImportController>>,
    command: Option<Json<StartImportCommand>>,
) -> Result<Response, AppError> {
    let command = command.map(|Json(c)| c).unwrap_or_default();
    let outcome = super::commands::start::handle(&controller, command).await?;

    let status = match outcome {
        StartOutcome::Started { .. } => {
            tracing::info!("Import started via API");
            StatusCode::ACCEPTED
        },
        StartOutcome::AlreadyRunning { .. } | StartOutcome::AlreadyComplete { .. } => {
            StatusCode::OK
        },
    };

    Ok((status, Json(outcome)).into_response())
}

#[tracing::instrument(skip(controller))]
async fn import_status(
    State(controller): State<Arc<ImportController>>,
) -> Result<Response, AppError> {
    let response = super::queries::status::handle(&controller, ImportStatusQuery::default()).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

#[tracing::instrument(skip(controller))]
async fn cancel_import(State(controller): State<Arc<ImportController>>) -> Response {
    let Ok(response) =
        super::commands::cancel::handle(&controller, CancelImportCommand::default()).await;
    (StatusCode::OK, Json(response)).into_response()
}

/// Reset all import state
///
/// Always answers `200 OK` with the reset report; failed steps are listed
/// in its `errors` field.
#[tracing::instrument(skip(controller))]
async fn reset_import(State(controller): State<Arc<ImportController>>) -> Response {
    let Ok(report) =
        super::commands::reset::handle(&controller, ResetImportCommand::default()).await;
    (StatusCode::OK, Json(report)).into_response()
}

impl From<StartImportError> for AppError {
    fn from(err: StartImportError) -> Self {
        match err {
            StartImportError::RelativeSource(_) => AppError::Validation(err.to_string()),
            StartImportError::Ingest(e) => AppError::Ingest(e),
        }
    }
}
