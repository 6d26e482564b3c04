//! Resume tracking
//!
//! There is no checkpoint table. Every bulk chunk commits atomically, chunks
//! are loaded in order, and the fallback records each line it gives up on in
//! the same transaction as the rows around it. So destination rows plus
//! skipped lines is exactly the number of source lines already applied, and
//! that alone tells us where to pick up.

use serde::Serialize;
use sqlx::PgPool;

use crate::decoder::DESTINATION_TABLE;
use crate::error::Result;
use crate::fallback::SKIPPED_TABLE;

/// Whole chunks already reflected in the destination.
pub fn processed_chunks(row_count: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    row_count / chunk_size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResumePoint {
    /// Source lines accounted for: destination rows plus skipped lines.
    pub row_count: u64,
    pub processed_chunks: u64,
    /// 1-based index of the first chunk still to load.
    pub next_chunk: u64,
    /// Leading lines of `next_chunk` committed by an interrupted fallback.
    pub applied_in_next: u64,
    pub is_complete: bool,
}

impl ResumePoint {
    pub fn from_count(row_count: u64, chunk_size: u64, total_lines: u64) -> Self {
        let processed = processed_chunks(row_count, chunk_size);
        let is_complete = row_count >= total_lines;
        Self {
            row_count,
            processed_chunks: processed,
            next_chunk: processed + 1,
            applied_in_next: if is_complete {
                0
            } else {
                row_count - processed * chunk_size
            },
            is_complete,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResumeTracker {
    pool: PgPool,
}

impl ResumeTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn row_count(&self) -> Result<u64> {
        applied_line_count(&self.pool).await
    }

    pub async fn resume_point(&self, chunk_size: u64, total_lines: u64) -> Result<ResumePoint> {
        let row_count = self.row_count().await?;
        Ok(ResumePoint::from_count(row_count, chunk_size, total_lines))
    }
}

/// Exact `COUNT(*)` of the destination table.
pub async fn destination_row_count(pool: &PgPool) -> Result<u64> {
    count(pool, DESTINATION_TABLE).await
}

/// Lines the fallback recorded as skipped.
pub async fn skipped_line_count(pool: &PgPool) -> Result<u64> {
    count(pool, SKIPPED_TABLE).await
}

/// Source lines already applied, loaded or skipped.
pub async fn applied_line_count(pool: &PgPool) -> Result<u64> {
    Ok(destination_row_count(pool).await? + skipped_line_count(pool).await?)
}

async fn count(pool: &PgPool, table: &str) -> Result<u64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}
