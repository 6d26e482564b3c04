//! Run liveness
//!
//! The running import claims the single `import_heartbeat` row when it
//! starts and refreshes it on an interval. Any process can then tell whether
//! an import is alive by how old `beat_at` is, without inspecting processes.
//!
//! The row doubles as the cross-process stop signal. Another process sets
//! `cancel_requested` or deletes the row, and the run's beat task cancels the
//! run at its next tick.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::status::{ImportPhase, StatusHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liveness {
    pub active: bool,
    pub run_id: Option<Uuid>,
    pub host: Option<String>,
    pub phase: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub beat_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub cancel_requested: bool,
}

impl Liveness {
    fn none() -> Self {
        Self {
            active: false,
            run_id: None,
            host: None,
            phase: None,
            started_at: None,
            beat_at: None,
            age_secs: None,
            cancel_requested: false,
        }
    }
}

/// What a refresh found in the heartbeat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatSignal {
    Continue,
    CancelRequested,
    /// The row is gone or belongs to another run.
    Released,
}

/// Handle to the periodic beat task. Dropping it stops the task, so a run
/// future dropped mid-flight cannot leave a heartbeat behind that keeps
/// claiming the import.
#[derive(Debug)]
pub struct HeartbeatTask {
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone)]
pub struct HeartbeatWriter {
    pool: PgPool,
    run_id: Uuid,
    host: String,
}

impl HeartbeatWriter {
    pub fn new(pool: PgPool, run_id: Uuid) -> Self {
        Self {
            pool,
            run_id,
            host: hostname::get()
                .unwrap_or_else(|_| "unknown".into())
                .to_string_lossy()
                .to_string(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Claim the heartbeat row for this run, clearing any stop request left
    /// by an earlier run.
    pub async fn beat(&self, phase: ImportPhase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_heartbeat (id, run_id, host, phase, started_at, beat_at, cancel_requested)
            VALUES (1, $1, $2, $3, NOW(), NOW(), FALSE)
            ON CONFLICT (id) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                host = EXCLUDED.host,
                phase = EXCLUDED.phase,
                started_at = CASE
                    WHEN import_heartbeat.run_id = EXCLUDED.run_id THEN import_heartbeat.started_at
                    ELSE EXCLUDED.started_at
                END,
                beat_at = NOW(),
                cancel_requested = CASE
                    WHEN import_heartbeat.run_id = EXCLUDED.run_id THEN import_heartbeat.cancel_requested
                    ELSE FALSE
                END
            "#,
        )
        .bind(self.run_id)
        .bind(&self.host)
        .bind(phase.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Refresh this run's row. Never recreates a row that was deleted.
    pub async fn refresh(&self, phase: ImportPhase) -> Result<BeatSignal> {
        let cancel_requested: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE import_heartbeat
            SET phase = $2, beat_at = NOW()
            WHERE id = 1 AND run_id = $1
            RETURNING cancel_requested
            "#,
        )
        .bind(self.run_id)
        .bind(phase.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match cancel_requested {
            None => BeatSignal::Released,
            Some(true) => BeatSignal::CancelRequested,
            Some(false) => BeatSignal::Continue,
        })
    }

    /// Spawn the periodic refresh. The phase is read from the status record
    /// on every tick; a stop request or a vanished row cancels `cancel`.
    pub fn start(
        &self,
        status: StatusHandle,
        every: Duration,
        cancel: CancellationToken,
    ) -> HeartbeatTask {
        let writer = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval_timer = interval(every);

            loop {
                interval_timer.tick().await;

                let phase = status.snapshot().await.phase;
                match writer.refresh(phase).await {
                    Ok(BeatSignal::Continue) => debug!(run_id = %writer.run_id, %phase, "Heartbeat"),
                    Ok(BeatSignal::CancelRequested) => {
                        if !cancel.is_cancelled() {
                            info!(run_id = %writer.run_id, "Stop requested by another process");
                            cancel.cancel();
                        }
                    },
                    Ok(BeatSignal::Released) => {
                        warn!(run_id = %writer.run_id, "Heartbeat row removed, stopping import");
                        cancel.cancel();
                        break;
                    },
                    Err(e) => warn!(run_id = %writer.run_id, error = %e, "Failed to write heartbeat"),
                }
            }
        });

        HeartbeatTask { handle }
    }

    /// Remove this run's heartbeat row. A row owned by another run is left alone.
    pub async fn clear(&self) -> Result<()> {
        clear_run_heartbeat(&self.pool, self.run_id).await
    }
}

/// Delete the heartbeat row if `run_id` still owns it.
pub async fn clear_run_heartbeat(pool: &PgPool, run_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM import_heartbeat WHERE id = 1 AND run_id = $1")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read the heartbeat and judge it against `stale_after`.
pub async fn read_liveness(pool: &PgPool, stale_after: Duration) -> Result<Liveness> {
    #[derive(sqlx::FromRow)]
    struct HeartbeatRow {
        run_id: Uuid,
        host: String,
        phase: String,
        started_at: DateTime<Utc>,
        beat_at: DateTime<Utc>,
        now: DateTime<Utc>,
        cancel_requested: bool,
    }

    let row: Option<HeartbeatRow> = sqlx::query_as(
        "SELECT run_id, host, phase, started_at, beat_at, NOW() AS now, cancel_requested \
         FROM import_heartbeat WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some(row) => {
            let age_secs = (row.now - row.beat_at).num_seconds();
            Liveness {
                active: is_fresh(age_secs, stale_after),
                run_id: Some(row.run_id),
                host: Some(row.host),
                phase: Some(row.phase),
                started_at: Some(row.started_at),
                beat_at: Some(row.beat_at),
                age_secs: Some(age_secs),
                cancel_requested: row.cancel_requested,
            }
        },
        None => Liveness::none(),
    })
}

/// Ask whichever run owns the heartbeat to stop. Returns whether a row was
/// flagged.
pub async fn request_cancel(pool: &PgPool) -> Result<bool> {
    let result = sqlx::query("UPDATE import_heartbeat SET cancel_requested = TRUE WHERE id = 1")
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Poll until no fresh heartbeat remains or `wait` runs out. Returns whether
/// the heartbeat went away in time.
pub async fn wait_until_inactive(
    pool: &PgPool,
    stale_after: Duration,
    wait: Duration,
    poll: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + wait;
    loop {
        if !read_liveness(pool, stale_after).await?.active {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Unconditionally delete the heartbeat row.
pub async fn clear_heartbeat(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM import_heartbeat").execute(pool).await?;
    Ok(result.rows_affected())
}

fn is_fresh(age_secs: i64, stale_after: Duration) -> bool {
    age_secs < stale_after.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_threshold() {
        let stale_after = Duration::from_secs(30);
        assert!(is_fresh(0, stale_after));
        assert!(is_fresh(29, stale_after));
        assert!(!is_fresh(30, stale_after));
        assert!(!is_fresh(3600, stale_after));
        // clock skew between hosts can make a fresh beat look slightly in the future
        assert!(is_fresh(-2, stale_after));
    }

    #[test]
    fn test_missing_row_is_inactive() {
        let liveness = Liveness::none();
        assert!(!liveness.active);
        assert!(liveness.run_id.is_none());
        assert!(!liveness.cancel_requested);
    }

    #[tokio::test]
    async fn test_dropping_the_task_handle_stops_the_task() {
        let (alive, stopped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<()>().await;
        });

        drop(HeartbeatTask { handle });

        // the sender goes away only when the task future is dropped
        let result = tokio::time::timeout(Duration::from_secs(5), stopped)
            .await
            .expect("task still running after its handle was dropped");
        assert!(result.is_err());
    }
}
