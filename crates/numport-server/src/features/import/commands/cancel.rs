use mediator::Request;
use numport_ingest::ImportController;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelImportCommand {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelImportResponse {
    /// A local run was active and has been asked to stop after its current chunk.
    pub cancelled: bool,
}

impl Request<Result<CancelImportResponse, Infallible>> for CancelImportCommand {}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: &ImportController,
    _command: CancelImportCommand,
) -> Result<CancelImportResponse, Infallible> {
    let cancelled = controller.cancel().await;
    Ok(CancelImportResponse { cancelled })
}
