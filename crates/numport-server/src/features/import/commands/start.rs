use mediator::Request;
use numport_ingest::{ImportController, IngestError, StartOutcome};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Start the import, optionally from a source other than the configured one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartImportCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartImportError {
    #[error("Source path must be absolute: {}", .0.display())]
    RelativeSource(PathBuf),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl Request<Result<StartOutcome, StartImportError>> for StartImportCommand {}

impl StartImportCommand {
    /// The server's working directory is not meaningful to API callers, so
    /// only absolute paths are accepted. Existence is checked by the
    /// pipeline, which reports a missing file as a failed run.
    pub fn validate(&self) -> Result<(), StartImportError> {
        match &self.source {
            Some(path) if !path.is_absolute() => {
                Err(StartImportError::RelativeSource(path.clone()))
            },
            _ => Ok(()),
        }
    }
}

#[tracing::instrument(skip(controller))]
pub async fn handle(
    controller: &ImportController,
    command: StartImportCommand,
) -> Result<StartOutcome, StartImportError> {
    command.validate()?;
    Ok(controller.start(command.source).await?)
}
