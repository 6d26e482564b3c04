//! Sequential import pipeline
//!
//! split -> for each chunk in order: bulk load (retried once on transient
//! errors) -> fallback on failure -> delete chunk file -> periodic
//! maintenance. The resume point is derived from the destination row count
//! plus the lines the fallback recorded as skipped, so an interrupted run
//! picks up at the first source line not yet applied.

use serde::Serialize;
use sqlx::PgPool;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bulk::BulkLoader;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::fallback::FallbackLoader;
use crate::heartbeat::HeartbeatWriter;
use crate::maintenance;
use crate::resume::ResumeTracker;
use crate::splitter::{ChunkFile, ChunkSplitter};
use crate::status::{ImportPhase, StatusHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed,
    AlreadyComplete,
    Cancelled,
}

/// Totals for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub run_id: Uuid,
    pub outcome: PipelineOutcome,
    pub total_lines: u64,
    pub total_chunks: u64,
    pub resumed_from_chunk: u64,
    pub chunks_loaded: u64,
    pub bulk_chunks: u64,
    pub fallback_chunks: u64,
    pub inserted_rows: u64,
    pub malformed_rows: u64,
    pub failed_rows: u64,
    pub duration_secs: u64,
}

impl PipelineSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcome: PipelineOutcome::Completed,
            total_lines: 0,
            total_chunks: 0,
            resumed_from_chunk: 1,
            chunks_loaded: 0,
            bulk_chunks: 0,
            fallback_chunks: 0,
            inserted_rows: 0,
            malformed_rows: 0,
            failed_rows: 0,
            duration_secs: 0,
        }
    }
}

pub struct ImportPipeline {
    pool: PgPool,
    config: IngestConfig,
    status: StatusHandle,
}

impl ImportPipeline {
    pub fn new(pool: PgPool, config: IngestConfig, status: StatusHandle) -> Self {
        Self {
            pool,
            config,
            status,
        }
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    /// Run the import to completion, cancellation or a fatal error.
    ///
    /// The status record ends in `completed`, `cancelled` or `failed` and the
    /// heartbeat row is removed whichever way the run ends.
    pub async fn run(&self, source: &Path, cancel: CancellationToken) -> Result<PipelineSummary> {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        self.status
            .begin_run(run_id, source.display().to_string())
            .await;

        let heartbeat = HeartbeatWriter::new(self.pool.clone(), run_id);
        if let Err(e) = heartbeat.beat(ImportPhase::Splitting).await {
            warn!(%run_id, error = %e, "Failed to claim heartbeat");
        }
        // Dropped with this future, so an aborted run stops beating too.
        let heartbeat_task = heartbeat.start(
            self.status.clone(),
            self.config.heartbeat_interval(),
            cancel.clone(),
        );

        info!(%run_id, source = %source.display(), "Import started");

        let mut summary = PipelineSummary::new(run_id);
        let result = self.execute(source, &cancel, &mut summary).await;

        drop(heartbeat_task);
        if let Err(e) = heartbeat.clear().await {
            warn!(%run_id, error = %e, "Failed to clear heartbeat");
        }

        summary.duration_secs = start.elapsed().as_secs();

        summary.outcome = match result {
            Ok(()) => summary.outcome,
            Err(IngestError::Cancelled) => PipelineOutcome::Cancelled,
            Err(e) => {
                error!(%run_id, error = %e, chunks_loaded = summary.chunks_loaded, "Import failed");
                self.status.finish(ImportPhase::Failed, Some(e.to_string())).await;
                return Err(e);
            },
        };

        let phase = match summary.outcome {
            PipelineOutcome::Cancelled => ImportPhase::Cancelled,
            _ => ImportPhase::Completed,
        };
        self.status.finish(phase, None).await;
        log_summary(&summary);
        Ok(summary)
    }

    async fn execute(
        &self,
        source: &Path,
        cancel: &CancellationToken,
        summary: &mut PipelineSummary,
    ) -> Result<()> {
        let splitter = ChunkSplitter::new(&self.config.chunk_dir, self.config.chunk_size);
        let plan = splitter.plan(source).await?;
        summary.total_lines = plan.total_lines;
        summary.total_chunks = plan.total_chunks;

        let resume = ResumeTracker::new(self.pool.clone())
            .resume_point(self.config.chunk_size, plan.total_lines)
            .await?;
        summary.resumed_from_chunk = resume.next_chunk;

        self.status
            .update(|s| {
                s.total_lines = plan.total_lines;
                s.total_chunks = plan.total_chunks;
                s.current_chunk = resume.processed_chunks;
            })
            .await;

        if resume.is_complete {
            info!(
                row_count = resume.row_count,
                total_chunks = plan.total_chunks,
                "All chunks already applied, nothing to do"
            );
            summary.outcome = PipelineOutcome::AlreadyComplete;
            return Ok(());
        }

        if resume.row_count > 0 {
            info!(
                row_count = resume.row_count,
                processed_chunks = resume.processed_chunks,
                next_chunk = resume.next_chunk,
                applied_in_next = resume.applied_in_next,
                "Resuming import"
            );
        }

        let chunks = splitter
            .write_chunks(source, &plan, resume.next_chunk, cancel)
            .await?;

        let bulk = BulkLoader::new(self.pool.clone(), self.config.staging_table.clone())?;
        let fallback = FallbackLoader::new(self.pool.clone(), self.config.batch_size);
        bulk.ensure_staging().await?;

        self.status.set_phase(ImportPhase::Loading).await;

        for chunk in &chunks {
            if cancel.is_cancelled() {
                info!(next_chunk = chunk.index, "Import cancelled between chunks");
                return Err(IngestError::Cancelled);
            }

            self.status.update(|s| s.current_chunk = chunk.index).await;
            let already_applied = if chunk.index == resume.next_chunk {
                resume.applied_in_next
            } else {
                0
            };
            self.load_chunk(&bulk, &fallback, chunk, already_applied, cancel, summary)
                .await?;

            if let Err(e) = splitter.remove_chunk(chunk).await {
                warn!(chunk = chunk.index, error = %e, "Failed to delete loaded chunk file");
            }
            summary.chunks_loaded += 1;

            if maintenance::is_due(chunk.index, plan.total_chunks, self.config.maintenance_every) {
                self.status.set_phase(ImportPhase::Maintenance).await;
                maintenance::run_best_effort(&self.pool, chunk.index).await;
                self.status.set_phase(ImportPhase::Loading).await;
            }
        }

        Ok(())
    }

    /// Bulk path first, fallback if it cannot apply the chunk. A chunk whose
    /// leading lines an interrupted fallback already committed goes straight
    /// to the fallback, since the bulk path can only apply whole chunks.
    async fn load_chunk(
        &self,
        bulk: &BulkLoader,
        fallback: &FallbackLoader,
        chunk: &ChunkFile,
        already_applied: u64,
        cancel: &CancellationToken,
        summary: &mut PipelineSummary,
    ) -> Result<()> {
        if already_applied > 0 {
            info!(chunk = chunk.index, already_applied, "Chunk partially applied, continuing row by row");
            return self
                .fallback_chunk(fallback, chunk, already_applied, cancel, summary)
                .await;
        }

        // Dropping the bulk future on cancel rolls its transaction back.
        let bulk_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            result = self.bulk_with_retry(bulk, chunk) => result,
        };

        match bulk_result {
            Ok(inserted) => {
                summary.bulk_chunks += 1;
                summary.inserted_rows += inserted;
                self.status
                    .update(|s| {
                        s.bulk_chunks += 1;
                        s.inserted_rows += inserted;
                    })
                    .await;
                Ok(())
            },
            Err(err @ IngestError::ChunkTransaction { .. }) => {
                warn!(chunk = chunk.index, error = %err, "Bulk load failed, falling back to row-by-row");
                self.fallback_chunk(fallback, chunk, 0, cancel, summary).await
            },
            Err(other) => Err(other),
        }
    }

    async fn fallback_chunk(
        &self,
        fallback: &FallbackLoader,
        chunk: &ChunkFile,
        already_applied: u64,
        cancel: &CancellationToken,
        summary: &mut PipelineSummary,
    ) -> Result<()> {
        let stats = fallback
            .resume_chunk(chunk.index, &chunk.path, already_applied, cancel)
            .await?;

        summary.fallback_chunks += 1;
        summary.inserted_rows += stats.inserted;
        summary.malformed_rows += stats.malformed;
        summary.failed_rows += stats.failed;
        self.status
            .update(|s| {
                s.fallback_chunks += 1;
                s.inserted_rows += stats.inserted;
                s.malformed_rows += stats.malformed;
                s.failed_rows += stats.failed;
                if let Some(sample) = stats.sample_errors.first() {
                    s.last_error = Some(format!(
                        "chunk {} line {}: {}",
                        chunk.index, sample.line, sample.message
                    ));
                }
            })
            .await;
        Ok(())
    }

    async fn bulk_with_retry(&self, bulk: &BulkLoader, chunk: &ChunkFile) -> Result<u64> {
        let mut attempt = 0u32;
        loop {
            match bulk.load_chunk(chunk.index, &chunk.path).await {
                Ok(inserted) => return Ok(inserted),
                Err(e) if e.is_retryable() && attempt < self.config.bulk_retries => {
                    attempt += 1;
                    warn!(
                        chunk = chunk.index,
                        attempt,
                        max_retries = self.config.bulk_retries,
                        error = %e,
                        "Bulk load failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn log_summary(summary: &PipelineSummary) {
    info!(
        run_id = %summary.run_id,
        outcome = ?summary.outcome,
        total_chunks = summary.total_chunks,
        resumed_from_chunk = summary.resumed_from_chunk,
        chunks_loaded = summary.chunks_loaded,
        bulk_chunks = summary.bulk_chunks,
        fallback_chunks = summary.fallback_chunks,
        inserted = summary.inserted_rows,
        malformed = summary.malformed_rows,
        failed = summary.failed_rows,
        duration_secs = summary.duration_secs,
        "Import finished"
    );
    if summary.malformed_rows + summary.failed_rows > 0 {
        warn!(
            skipped = summary.malformed_rows + summary.failed_rows,
            "Skipped rows recorded in portability_skipped; later runs count them as applied and do not retry them"
        );
    }
}
