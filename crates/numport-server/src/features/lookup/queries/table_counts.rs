use mediator::Request;
use numport_ingest::reference::{reference_counts, TableCount};
use numport_ingest::IngestError;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCountsQuery {}

#[derive(Debug, Clone, Serialize)]
pub struct TableCountsResponse {
    pub tables: Vec<TableCount>,
}

#[derive(Debug, thiserror::Error)]
pub enum TableCountsError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl Request<Result<TableCountsResponse, TableCountsError>> for TableCountsQuery {}

#[tracing::instrument(skip(pool))]
pub async fn handle(
    pool: PgPool,
    _query: TableCountsQuery,
) -> Result<TableCountsResponse, TableCountsError> {
    let tables = reference_counts(&pool).await?;
    Ok(TableCountsResponse { tables })
}
