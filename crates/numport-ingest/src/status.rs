//! In-process import status
//!
//! One [`ImportStatus`] record lives behind a single `RwLock`. The pipeline
//! is the only writer; pollers (HTTP handlers, the CLI monitor) read cloned
//! snapshots and never hold the lock across an await.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Import phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    #[default]
    Idle,
    Splitting,
    Loading,
    Maintenance,
    Completed,
    Failed,
    Cancelled,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Idle => "idle",
            ImportPhase::Splitting => "splitting",
            ImportPhase::Loading => "loading",
            ImportPhase::Maintenance => "maintenance",
            ImportPhase::Completed => "completed",
            ImportPhase::Failed => "failed",
            ImportPhase::Cancelled => "cancelled",
        }
    }

    /// Phases during which a run owns the destination table.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ImportPhase::Splitting | ImportPhase::Loading | ImportPhase::Maintenance
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::Completed | ImportPhase::Failed | ImportPhase::Cancelled
        )
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ImportPhase {
    fn from(s: &str) -> Self {
        match s {
            "splitting" => ImportPhase::Splitting,
            "loading" => ImportPhase::Loading,
            "maintenance" => ImportPhase::Maintenance,
            "completed" => ImportPhase::Completed,
            "failed" => ImportPhase::Failed,
            "cancelled" => ImportPhase::Cancelled,
            _ => ImportPhase::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImportStatus {
    pub run_id: Option<Uuid>,
    pub phase: ImportPhase,
    pub source_file: Option<String>,
    pub current_chunk: u64,
    pub total_chunks: u64,
    pub total_lines: u64,
    pub inserted_rows: u64,
    pub malformed_rows: u64,
    pub failed_rows: u64,
    pub bulk_chunks: u64,
    pub fallback_chunks: u64,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportStatus {
    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn elapsed_secs(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - started).num_seconds())
    }
}

/// Shared handle to the single status record.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<ImportStatus>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> ImportStatus {
        self.inner.read().await.clone()
    }

    /// Apply a mutation under the write lock.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ImportStatus),
    {
        let mut status = self.inner.write().await;
        f(&mut status);
    }

    /// Reset to a fresh running record for a new run.
    pub async fn begin_run(&self, run_id: Uuid, source_file: String) {
        self.update(|s| {
            *s = ImportStatus {
                run_id: Some(run_id),
                phase: ImportPhase::Splitting,
                source_file: Some(source_file),
                started_at: Some(Utc::now()),
                ..ImportStatus::default()
            };
        })
        .await;
    }

    pub async fn set_phase(&self, phase: ImportPhase) {
        self.update(|s| s.phase = phase).await;
    }

    /// Move into a terminal phase and stamp the finish time.
    pub async fn finish(&self, phase: ImportPhase, error: Option<String>) {
        self.update(|s| {
            s.phase = phase;
            s.finished_at = Some(Utc::now());
            if error.is_some() {
                s.last_error = error;
            }
        })
        .await;
    }

    pub async fn clear(&self) {
        self.update(|s| *s = ImportStatus::default()).await;
    }
}
