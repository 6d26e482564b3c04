//! Periodic table maintenance between chunks.

use sqlx::PgPool;
use std::time::Instant;
use tracing::{info, warn};

use crate::decoder::DESTINATION_TABLE;
use crate::error::{IngestError, Result};

/// Whether maintenance is due after `chunk` (1-based) of `total_chunks`.
/// `every == 0` disables periodic runs but keeps the final one.
pub fn is_due(chunk: u64, total_chunks: u64, every: u64) -> bool {
    chunk == total_chunks || (every > 0 && chunk % every == 0)
}

/// `VACUUM ANALYZE` the destination. VACUUM cannot run inside a transaction
/// block, so this goes through the simple query protocol on its own.
pub async fn vacuum_analyze(pool: &PgPool) -> Result<()> {
    let start = Instant::now();
    sqlx::raw_sql(&format!("VACUUM ANALYZE {}", DESTINATION_TABLE))
        .execute(pool)
        .await
        .map_err(IngestError::Maintenance)?;

    info!(
        table = DESTINATION_TABLE,
        duration_ms = start.elapsed().as_millis() as u64,
        "VACUUM ANALYZE complete"
    );
    Ok(())
}

/// Run maintenance, logging instead of failing.
pub async fn run_best_effort(pool: &PgPool, after_chunk: u64) {
    if let Err(e) = vacuum_analyze(pool).await {
        warn!(after_chunk, error = %e, "Maintenance failed, continuing");
    }
}
