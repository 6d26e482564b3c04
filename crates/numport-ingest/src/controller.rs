//! Import controller
//!
//! Owns at most one background pipeline run per process and exposes the
//! operational controls: start, status, progress, cancel and reset. Runs in
//! other processes are detected through the heartbeat table.

use serde::Serialize;
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::heartbeat::{
    clear_run_heartbeat, read_liveness, request_cancel, wait_until_inactive, Liveness,
};
use crate::pipeline::ImportPipeline;
use crate::progress::{ProgressReport, ProgressReporter};
use crate::reset::{full_reset, ResetReport};
use crate::resume::applied_line_count;
use crate::status::{ImportPhase, ImportStatus, StatusHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { source: String },
    AlreadyRunning { host: Option<String> },
    AlreadyComplete { row_count: u64 },
}

struct ActiveRun {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveRun {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct ImportController {
    pool: PgPool,
    config: IngestConfig,
    status: StatusHandle,
    active: Mutex<Option<ActiveRun>>,
    progress: Mutex<ProgressReporter>,
}

impl ImportController {
    pub fn new(pool: PgPool, config: IngestConfig) -> Self {
        let progress = ProgressReporter::new(
            pool.clone(),
            config.expected_total,
            config.heartbeat_stale_after(),
        );
        Self {
            pool,
            config,
            status: StatusHandle::new(),
            active: Mutex::new(None),
            progress: Mutex::new(progress),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Start an import in the background unless one is running or the
    /// destination is already full. Calling this repeatedly is harmless.
    pub async fn start(&self, source: Option<PathBuf>) -> Result<StartOutcome> {
        let mut active = self.active.lock().await;

        if active.as_ref().map(ActiveRun::is_alive).unwrap_or(false) {
            return Ok(StartOutcome::AlreadyRunning {
                host: None,
            });
        }

        let liveness = self.liveness().await?;
        if liveness.active {
            info!(host = ?liveness.host, run_id = ?liveness.run_id, "Import already running elsewhere");
            return Ok(StartOutcome::AlreadyRunning {
                host: liveness.host,
            });
        }

        // loaded rows plus recorded skips
        let row_count = applied_line_count(&self.pool).await?;
        if row_count >= self.config.expected_total {
            return Ok(StartOutcome::AlreadyComplete { row_count });
        }

        let source = source.unwrap_or_else(|| self.config.source_file.clone());
        let cancel = CancellationToken::new();
        let pipeline = ImportPipeline::new(self.pool.clone(), self.config.clone(), self.status.clone());

        let run_source = source.clone();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = pipeline.run(&run_source, run_cancel).await {
                error!(error = %e, "Background import failed");
            }
        });

        *active = Some(ActiveRun { cancel, handle });
        info!(source = %source.display(), "Background import started");

        Ok(StartOutcome::Started {
            source: source.display().to_string(),
        })
    }

    pub async fn status(&self) -> ImportStatus {
        self.status.snapshot().await
    }

    pub async fn progress(&self) -> Result<ProgressReport> {
        self.progress.lock().await.sample().await
    }

    pub async fn liveness(&self) -> Result<Liveness> {
        read_liveness(&self.pool, self.config.heartbeat_stale_after()).await
    }

    /// Request cancellation of the local run. Returns whether one was running.
    pub async fn cancel(&self) -> bool {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(run) if run.is_alive() => {
                info!("Cancellation requested");
                run.cancel.cancel();
                true
            },
            _ => false,
        }
    }

    /// Stop any local run, then wipe chunks, staging, destination and heartbeat.
    ///
    /// A run in another process is asked to stop through the heartbeat row
    /// and given `reset_wait_secs` to wind down before the wipe.
    pub async fn reset(&self) -> ResetReport {
        let cancelled_run = self.stop_active_run().await;
        let cancelled_remote_run = self.stop_remote_run().await;

        let mut report = full_reset(&self.pool, &self.config).await;
        report.cancelled_run = cancelled_run;
        report.cancelled_remote_run = cancelled_remote_run;
        self.status.clear().await;
        report
    }

    /// Stop the local run, if any, and wait for it. Used on process shutdown.
    pub async fn shutdown(&self) -> bool {
        self.stop_active_run().await
    }

    async fn stop_active_run(&self) -> bool {
        let Some(run) = self.active.lock().await.take() else {
            return false;
        };
        if !run.is_alive() {
            return false;
        }

        run.cancel.cancel();
        let wait = Duration::from_secs(self.config.reset_wait_secs);
        let mut handle = run.handle;
        match tokio::time::timeout(wait, &mut handle).await {
            Ok(_) => info!("Running import stopped"),
            Err(_) => {
                warn!(wait_secs = self.config.reset_wait_secs, "Import did not stop in time, aborting");
                handle.abort();
                // Wait for the run future to be dropped; its heartbeat task goes with it.
                let _ = handle.await;
                if let Some(run_id) = self.status.snapshot().await.run_id {
                    if let Err(e) = clear_run_heartbeat(&self.pool, run_id).await {
                        warn!(%run_id, error = %e, "Failed to clear heartbeat of aborted run");
                    }
                }
                self.status
                    .finish(ImportPhase::Cancelled, Some("aborted after stop timeout".to_string()))
                    .await;
            },
        }
        true
    }

    /// Ask a run owned by another process to stop and wait for its heartbeat
    /// to disappear or go stale. Returns whether such a run was found.
    async fn stop_remote_run(&self) -> bool {
        let liveness = match self.liveness().await {
            Ok(liveness) => liveness,
            Err(e) => {
                warn!(error = %e, "Could not read heartbeat before reset");
                return false;
            },
        };
        if !liveness.active {
            return false;
        }

        info!(host = ?liveness.host, run_id = ?liveness.run_id, "Asking running import to stop");
        if let Err(e) = request_cancel(&self.pool).await {
            warn!(error = %e, "Failed to request cancellation");
        }

        let stopped = wait_until_inactive(
            &self.pool,
            self.config.heartbeat_stale_after(),
            Duration::from_secs(self.config.reset_wait_secs),
            self.config.heartbeat_interval().min(Duration::from_secs(1)),
        )
        .await;

        match stopped {
            Ok(true) => info!(host = ?liveness.host, "Running import stopped"),
            Ok(false) => warn!(
                host = ?liveness.host,
                wait_secs = self.config.reset_wait_secs,
                "Import did not stop in time, resetting anyway"
            ),
            Err(e) => warn!(error = %e, "Could not confirm the import stopped"),
        }
        true
    }
}
