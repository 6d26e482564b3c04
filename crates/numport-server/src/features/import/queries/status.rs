use mediator::Request;
use numport_ingest::progress::ProgressReport;
use numport_ingest::{ImportController, ImportStatus, IngestError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStatusQuery {}

#[derive(Debug, Clone, Serialize)]
pub struct ImportStatusResponse {
    /// This process's view of its own run.
    pub status: ImportStatus,
    /// Database-derived progress, covering runs in any process.
    pub progress: ProgressReport,
}

impl Request<Result<ImportStatusResponse, IngestError>> for ImportStatusQuery {}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: &ImportController,
    _query: ImportStatusQuery,
) -> Result<ImportStatusResponse, IngestError> {
    let status = controller.status().await;
    let progress = controller.progress().await?;
    Ok(ImportStatusResponse { status, progress })
}
