//! numport ingest library
//!
//! Bulk ingestion of the phone-number portability export into PostgreSQL.
//!
//! The export (tens of millions of `;`-separated lines) is split into chunk
//! files, and each chunk is loaded through `COPY` into a staging table and
//! transformed into `portability_history` in a single transaction. Chunks the
//! bulk path cannot apply are loaded row by row, and the lines they skip are
//! recorded in `portability_skipped`. Progress survives restarts because the
//! resume point is derived from destination rows plus recorded skips.
//!
//! # Example
//!
//! ```no_run
//! use numport_ingest::{IngestConfig, ImportPipeline, StatusHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn import(pool: sqlx::PgPool) -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let source = config.source_file.clone();
//!     let pipeline = ImportPipeline::new(pool, config, StatusHandle::new());
//!     let summary = pipeline.run(&source, CancellationToken::new()).await?;
//!     println!("inserted {} rows", summary.inserted_rows);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod bulk;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod heartbeat;
pub mod maintenance;
pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod reset;
pub mod resume;
pub mod splitter;
pub mod status;

pub use config::IngestConfig;
pub use controller::{ImportController, StartOutcome};
pub use error::{IngestError, Result};
pub use pipeline::{ImportPipeline, PipelineOutcome, PipelineSummary};
pub use status::{ImportPhase, ImportStatus, StatusHandle};
