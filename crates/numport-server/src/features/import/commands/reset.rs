use mediator::Request;
use numport_ingest::reset::ResetReport;
use numport_ingest::ImportController;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// Stop any local run and delete every imported row, chunk file, staging
/// table and the heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetImportCommand {}

// Step failures are reported inside the ResetReport, not as an error.
impl Request<Result<ResetReport, Infallible>> for ResetImportCommand {}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: &ImportController,
    _command: ResetImportCommand,
) -> Result<ResetReport, Infallible> {
    let report = controller.reset().await;
    if report.is_clean() {
        tracing::info!(rows_deleted = report.rows_deleted, "Import reset via API");
    } else {
        tracing::warn!(failed_steps = report.errors.len(), "Import reset incomplete");
    }
    Ok(report)
}
