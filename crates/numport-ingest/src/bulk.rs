//! Bulk chunk loader
//!
//! A chunk is applied in one transaction: `COPY` the raw file into an
//! all-text staging table, transform-insert into the destination, truncate
//! staging, commit. Any failure rolls the whole chunk back, staging rows
//! included, and is reported as [`IngestError::ChunkTransaction`] so the
//! caller can hand the chunk to the fallback loader.

use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::validate_identifier;
use crate::decoder::{
    destination_columns, staging_columns, transform_select_list, DESTINATION_TABLE,
};
use crate::error::{IngestError, Result};

/// Block size used when streaming a chunk file into `COPY`.
pub const COPY_BLOCK_SIZE: usize = 64 * 1024;

/// Quote byte that never appears in the export, so `"` stays literal.
const COPY_QUOTE: &str = r"E'\x01'";

#[derive(Debug, Clone)]
pub struct BulkLoader {
    pool: PgPool,
    staging_table: String,
}

impl BulkLoader {
    /// Create a loader. The staging table name is interpolated into SQL and
    /// must be a plain identifier.
    pub fn new(pool: PgPool, staging_table: impl Into<String>) -> Result<Self> {
        let staging_table = staging_table.into();
        validate_identifier(&staging_table)?;
        Ok(Self {
            pool,
            staging_table,
        })
    }

    pub fn staging_table(&self) -> &str {
        &self.staging_table
    }

    /// Create the unlogged staging table if needed and empty it.
    pub async fn ensure_staging(&self) -> Result<()> {
        let columns = staging_columns()
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect::<Vec<_>>()
            .join(", ");

        sqlx::query(&format!(
            "CREATE UNLOGGED TABLE IF NOT EXISTS {} ({})",
            self.staging_table, columns
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!("TRUNCATE {}", self.staging_table))
            .execute(&self.pool)
            .await?;

        debug!(staging_table = %self.staging_table, "Staging table ready");
        Ok(())
    }

    /// Load one chunk file. Returns the number of rows inserted.
    pub async fn load_chunk(&self, chunk: u64, path: &Path) -> Result<u64> {
        let start = Instant::now();
        let inserted = self
            .apply(path)
            .await
            .map_err(|source| IngestError::ChunkTransaction { chunk, source })?;

        info!(
            chunk,
            rows = inserted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunk bulk loaded"
        );
        Ok(inserted)
    }

    async fn apply(&self, path: &Path) -> std::result::Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let copied = self.copy_file(&mut tx, path).await?;

        let inserted = sqlx::query(&self.transform_statement())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(&format!("TRUNCATE {}", self.staging_table))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(copied, inserted, "Staging transformed into destination");
        Ok(inserted)
    }

    async fn copy_file(
        &self,
        conn: &mut PgConnection,
        path: &Path,
    ) -> std::result::Result<u64, sqlx::Error> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut copy = conn.copy_in_raw(&self.copy_statement()).await?;
        let mut buf = vec![0u8; COPY_BLOCK_SIZE];

        loop {
            let n = match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    copy.abort(format!("reading chunk file failed: {e}")).await?;
                    return Err(e.into());
                },
            };
            copy.send(&buf[..n]).await?;
        }

        copy.finish().await
    }

    fn copy_statement(&self) -> String {
        let columns = staging_columns().join(", ");
        format!(
            "COPY {table} ({columns}) FROM STDIN WITH (FORMAT csv, DELIMITER ';', QUOTE {COPY_QUOTE}, FORCE_NOT_NULL ({columns}))",
            table = self.staging_table,
        )
    }

    fn transform_statement(&self) -> String {
        format!(
            "INSERT INTO {} ({})\nSELECT\n    {}\nFROM {}",
            DESTINATION_TABLE,
            destination_columns(),
            transform_select_list(),
            self.staging_table
        )
    }
}
