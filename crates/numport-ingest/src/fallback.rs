//! Row-by-row fallback loader
//!
//! Used for chunks the bulk path could not apply. Every line is decoded in
//! Rust and inserted under its own savepoint, so a bad row costs only itself.
//! A line that cannot be loaded is recorded in `portability_skipped` inside
//! the same transaction, which keeps destination rows plus skipped lines equal
//! to the lines applied. Work is committed every `batch_size` lines;
//! cancellation is honoured only at those commit points.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder::{decode_bytes, insert_statement, DecodeRejection, FieldValue, FIELD_COUNT};
use crate::error::{IngestError, Result};

/// Number of individual row errors kept and logged per chunk.
pub const MAX_SAMPLE_ERRORS: usize = 5;

/// Lines the fallback gave up on, keyed by chunk and line number.
pub const SKIPPED_TABLE: &str = "portability_skipped";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleError {
    pub line: u64,
    pub message: String,
}

/// Outcome of one fallback chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FallbackStats {
    pub lines: u64,
    pub inserted: u64,
    pub malformed: u64,
    pub failed: u64,
    pub sample_errors: Vec<SampleError>,
}

impl FallbackStats {
    pub fn skipped(&self) -> u64 {
        self.malformed + self.failed
    }

    fn record_error(&mut self, line: u64, err: &IngestError) {
        if self.sample_errors.len() < MAX_SAMPLE_ERRORS {
            self.sample_errors.push(SampleError {
                line,
                message: err.to_string(),
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackLoader {
    pool: PgPool,
    batch_size: usize,
    insert_sql: String,
    skip_sql: String,
}

impl FallbackLoader {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            insert_sql: insert_statement(),
            skip_sql: format!(
                "INSERT INTO {} (chunk_index, line_number, reason) VALUES ($1, $2, $3) \
                 ON CONFLICT (chunk_index, line_number) DO NOTHING",
                SKIPPED_TABLE
            ),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load every well-formed line of a chunk, skipping and recording the rest.
    ///
    /// Returns [`IngestError::Cancelled`] if the token fires; batches committed
    /// before that point stay in the destination.
    pub async fn load_chunk(
        &self,
        chunk: u64,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<FallbackStats> {
        self.resume_chunk(chunk, path, 0, cancel).await
    }

    /// Like [`load_chunk`](Self::load_chunk), but the first `already_applied`
    /// lines were committed by an earlier, interrupted fallback run and are
    /// passed over.
    pub async fn resume_chunk(
        &self,
        chunk: u64,
        path: &Path,
        already_applied: u64,
        cancel: &CancellationToken,
    ) -> Result<FallbackStats> {
        let start = Instant::now();
        let mut reader = BufReader::new(File::open(path).await?);
        let mut stats = FallbackStats::default();
        let mut line = Vec::with_capacity(512);
        let mut line_no = 0u64;
        let mut in_batch = 0usize;

        info!(
            chunk,
            batch_size = self.batch_size,
            already_applied,
            "Loading chunk row by row"
        );

        let mut tx = self.pool.begin().await?;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            line_no += 1;
            if line_no <= already_applied {
                continue;
            }
            stats.lines += 1;

            match decode_bytes(&line) {
                Ok(record) => match self.insert_isolated(&mut tx, line_no, record.values()).await {
                    Ok(()) => stats.inserted += 1,
                    Err(err @ IngestError::RowInsert { .. }) => {
                        stats.failed += 1;
                        if stats.sample_errors.len() < MAX_SAMPLE_ERRORS {
                            error!(chunk, line = line_no, error = %err, "Row insert failed (isolated with savepoint)");
                        }
                        self.record_skip(&mut tx, chunk, line_no, &err).await?;
                        stats.record_error(line_no, &err);
                    },
                    Err(other) => return Err(other),
                },
                Err(rejection) => {
                    stats.malformed += 1;
                    let err = rejection_error(line_no, rejection);
                    if stats.sample_errors.len() < MAX_SAMPLE_ERRORS {
                        warn!(chunk, line = line_no, error = %err, "Skipping malformed record");
                    }
                    self.record_skip(&mut tx, chunk, line_no, &err).await?;
                    stats.record_error(line_no, &err);
                },
            }

            in_batch += 1;
            if in_batch >= self.batch_size {
                tx.commit().await?;
                debug!(chunk, lines = stats.lines, inserted = stats.inserted, "Batch committed");
                in_batch = 0;

                if cancel.is_cancelled() {
                    info!(chunk, line = line_no, "Fallback load cancelled at batch boundary");
                    return Err(IngestError::Cancelled);
                }
                tx = self.pool.begin().await?;
            }
        }

        tx.commit().await?;

        if stats.skipped() > 0 {
            error!(
                chunk,
                inserted = stats.inserted,
                malformed = stats.malformed,
                failed = stats.failed,
                total = stats.lines,
                "Fallback load completed with skipped rows"
            );
            let errors = stats.skipped() as usize;
            if errors > MAX_SAMPLE_ERRORS {
                error!(
                    additional_errors = errors - MAX_SAMPLE_ERRORS,
                    "Additional errors not shown"
                );
            }
        }

        info!(
            chunk,
            inserted = stats.inserted,
            lines = stats.lines,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunk loaded via fallback"
        );

        Ok(stats)
    }

    async fn record_skip(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        chunk: u64,
        line: u64,
        err: &IngestError,
    ) -> Result<()> {
        sqlx::query(&self.skip_sql)
            .bind(chunk as i64)
            .bind(line as i64)
            .bind(err.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Insert one row under a savepoint. Only the row's own failure maps to
    /// [`IngestError::RowInsert`]; savepoint failures mean the connection is gone.
    async fn insert_isolated(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        line: u64,
        values: &[FieldValue],
    ) -> Result<()> {
        sqlx::query("SAVEPOINT row_savepoint").execute(&mut **tx).await?;

        let mut query = sqlx::query(&self.insert_sql);
        for value in values {
            query = match value {
                FieldValue::Text(v) => query.bind(v.clone()),
                FieldValue::Int(v) => query.bind(*v),
            };
        }

        match query.execute(&mut **tx).await {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT row_savepoint")
                    .execute(&mut **tx)
                    .await?;
                Ok(())
            },
            Err(source) => {
                sqlx::query("ROLLBACK TO SAVEPOINT row_savepoint")
                    .execute(&mut **tx)
                    .await?;
                Err(IngestError::RowInsert { line, source })
            },
        }
    }
}

fn rejection_error(line: u64, rejection: DecodeRejection) -> IngestError {
    match rejection {
        DecodeRejection::FieldCountMismatch { found } => IngestError::MalformedRecord {
            line,
            expected: FIELD_COUNT,
            found,
        },
        DecodeRejection::InvalidEncoding => {
            IngestError::Encoding(format!("line {line} is not valid UTF-8"))
        },
    }
}
