//! Full reset of import state
//!
//! Returns the system to "nothing imported": no chunk files, no staging
//! tables, an empty destination, no skipped-line records and no heartbeat. Every step is attempted
//! even when an earlier one fails; failures are collected in the report.
//! Stopping running imports first, local or remote, is the controller's job.

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::decoder::DESTINATION_TABLE;
use crate::fallback::SKIPPED_TABLE;
use crate::heartbeat::clear_heartbeat;
use crate::resume::{destination_row_count, skipped_line_count};
use crate::splitter::ChunkSplitter;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    /// A running import in this process was cancelled before resetting.
    pub cancelled_run: bool,
    /// Another process held a fresh heartbeat and was asked to stop.
    pub cancelled_remote_run: bool,
    pub chunk_files_removed: usize,
    pub staging_tables_dropped: Vec<String>,
    pub rows_deleted: u64,
    pub skipped_lines_deleted: u64,
    pub heartbeat_cleared: bool,
    pub errors: Vec<String>,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn step_failed(&mut self, step: &str, error: impl std::fmt::Display) {
        warn!(step, error = %error, "Reset step failed");
        self.errors.push(format!("{step}: {error}"));
    }
}

pub async fn full_reset(pool: &PgPool, config: &IngestConfig) -> ResetReport {
    let mut report = ResetReport::default();

    let splitter = ChunkSplitter::new(&config.chunk_dir, config.chunk_size);
    match splitter.remove_all().await {
        Ok(removed) => report.chunk_files_removed = removed,
        Err(e) => report.step_failed("remove chunk files", e),
    }

    for table in config.all_staging_tables() {
        match sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(pool)
            .await
        {
            Ok(_) => report.staging_tables_dropped.push(table.to_string()),
            Err(e) => report.step_failed("drop staging table", e),
        }
    }

    match destination_row_count(pool).await {
        Ok(rows) => report.rows_deleted = rows,
        Err(e) => report.step_failed("count destination rows", e),
    }
    if let Err(e) = sqlx::query(&format!("TRUNCATE {} RESTART IDENTITY", DESTINATION_TABLE))
        .execute(pool)
        .await
    {
        report.rows_deleted = 0;
        report.step_failed("truncate destination", e);
    }

    match skipped_line_count(pool).await {
        Ok(lines) => report.skipped_lines_deleted = lines,
        Err(e) => report.step_failed("count skipped lines", e),
    }
    if let Err(e) = sqlx::query(&format!("TRUNCATE {}", SKIPPED_TABLE))
        .execute(pool)
        .await
    {
        report.skipped_lines_deleted = 0;
        report.step_failed("truncate skipped lines", e);
    }

    match clear_heartbeat(pool).await {
        Ok(_) => report.heartbeat_cleared = true,
        Err(e) => report.step_failed("clear heartbeat", e),
    }

    info!(
        chunk_files_removed = report.chunk_files_removed,
        staging_tables_dropped = report.staging_tables_dropped.len(),
        rows_deleted = report.rows_deleted,
        skipped_lines_deleted = report.skipped_lines_deleted,
        errors = report.errors.len(),
        "Import state reset"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_steps_are_collected() {
        let mut report = ResetReport::default();
        assert!(report.is_clean());
        report.step_failed("remove chunk files", "permission denied");
        assert!(!report.is_clean());
        assert_eq!(report.errors, vec!["remove chunk files: permission denied"]);
    }
}
