//! Error taxonomy for the ingestion pipeline.
//!
//! Only [`IngestError::SourceNotFound`] and connection-level database errors
//! end a run. Everything below the chunk level is absorbed into counters by
//! the loaders.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Malformed record at line {line}: expected {expected} fields, found {found}")]
    MalformedRecord {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// The bulk path rolled back; the chunk must go through the fallback loader.
    #[error("Chunk {chunk} bulk load failed: {source}")]
    ChunkTransaction {
        chunk: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("Row insert failed at line {line}: {source}")]
    RowInsert {
        line: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("Maintenance failed: {0}")]
    Maintenance(#[source] sqlx::Error),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether retrying the same chunk could plausibly succeed.
    ///
    /// Data exceptions (SQLSTATE class 22) and integrity violations (class 23)
    /// fail the same way every time; retrying them only delays the fallback.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::ChunkTransaction { source, .. } => match source {
                sqlx::Error::Database(db) => !db
                    .code()
                    .map(|code| code.starts_with("22") || code.starts_with("23"))
                    .unwrap_or(false),
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::Protocol(_)
                | sqlx::Error::WorkerCrashed => true,
                _ => false,
            },
            _ => false,
        }
    }

    /// Errors that end the whole run rather than a single chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::SourceNotFound(_)
                | IngestError::Database(_)
                | IngestError::Io(_)
                | IngestError::Config(_)
        )
    }
}

impl From<numport_common::NumportError> for IngestError {
    fn from(err: numport_common::NumportError) -> Self {
        match err {
            numport_common::NumportError::Io(e) => IngestError::Io(e),
            other => IngestError::Config(other.to_string()),
        }
    }
}
