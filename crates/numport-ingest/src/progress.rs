//! Progress and speed reporting
//!
//! Read-only observer of an import. It samples how many source lines are
//! applied (destination rows plus lines the fallback recorded as skipped),
//! turns successive samples into an instantaneous speed, smooths that over a
//! small window and estimates the time remaining. Liveness comes from the
//! heartbeat table, so the reporter works from any process.

use serde::Serialize;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::decoder::DESTINATION_TABLE;
use crate::error::Result;
use crate::heartbeat::read_liveness;
use crate::resume::applied_line_count;

/// Number of speed samples averaged.
pub const SPEED_WINDOW: usize = 10;

/// Moving window of positive instantaneous speeds, in rows per second.
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Default for SpeedWindow {
    fn default() -> Self {
        Self::new(SPEED_WINDOW)
    }
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a speed. Zero and negative speeds (stalls, resets) are ignored.
    pub fn push(&mut self, speed: f64) {
        if !speed.is_finite() || speed <= 0.0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(speed);
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub row_count: u64,
    pub expected_total: u64,
    pub percent: f64,
    pub instant_speed: f64,
    pub average_speed: f64,
    pub eta_secs: Option<u64>,
    /// A fresh heartbeat exists.
    pub active: bool,
    pub complete: bool,
    pub elapsed_secs: u64,
}

impl ProgressReport {
    pub fn compute(
        row_count: u64,
        expected_total: u64,
        instant_speed: f64,
        average_speed: f64,
        active: bool,
        elapsed_secs: u64,
    ) -> Self {
        let complete = row_count >= expected_total;
        let percent = if expected_total == 0 {
            100.0
        } else {
            (row_count as f64 / expected_total as f64 * 100.0).min(100.0)
        };
        let eta_secs = if complete {
            Some(0)
        } else if average_speed > 0.0 {
            Some(((expected_total - row_count) as f64 / average_speed).ceil() as u64)
        } else {
            None
        };

        Self {
            row_count,
            expected_total,
            percent,
            instant_speed,
            average_speed,
            eta_secs,
            active,
            complete,
            elapsed_secs,
        }
    }
}

/// Human-readable destination table sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSize {
    pub data_size: String,
    pub total_size: String,
}

pub async fn table_size(pool: &PgPool) -> Result<TableSize> {
    let (data_size, total_size): (String, String) = sqlx::query_as(&format!(
        "SELECT pg_size_pretty(pg_relation_size('{t}')), pg_size_pretty(pg_total_relation_size('{t}'))",
        t = DESTINATION_TABLE
    ))
    .fetch_one(pool)
    .await?;

    Ok(TableSize {
        data_size,
        total_size,
    })
}

pub struct ProgressReporter {
    pool: PgPool,
    expected_total: u64,
    stale_after: Duration,
    window: SpeedWindow,
    last: Option<(u64, Instant)>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(pool: PgPool, expected_total: u64, stale_after: Duration) -> Self {
        Self {
            pool,
            expected_total,
            stale_after,
            window: SpeedWindow::default(),
            last: None,
            started: Instant::now(),
        }
    }

    /// Take one sample. The first sample has no speed.
    pub async fn sample(&mut self) -> Result<ProgressReport> {
        let row_count = applied_line_count(&self.pool).await?;
        let now = Instant::now();

        let instant_speed = match self.last {
            Some((prev_count, prev_at)) => {
                let elapsed = now.duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    (row_count as f64 - prev_count as f64) / elapsed
                } else {
                    0.0
                }
            },
            None => 0.0,
        };
        self.window.push(instant_speed);
        self.last = Some((row_count, now));

        let liveness = read_liveness(&self.pool, self.stale_after).await?;

        Ok(ProgressReport::compute(
            row_count,
            self.expected_total,
            instant_speed.max(0.0),
            self.window.average(),
            liveness.active,
            now.duration_since(self.started).as_secs(),
        ))
    }

    /// Sample every `every` until cancelled or `on_report` breaks.
    /// Sampling errors are logged and the loop carries on.
    pub async fn run<F>(&mut self, every: Duration, cancel: CancellationToken, mut on_report: F)
    where
        F: FnMut(&ProgressReport) -> ControlFlow<()>,
    {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sample().await {
                        Ok(report) => {
                            if on_report(&report).is_break() {
                                break;
                            }
                        },
                        Err(e) => warn!(error = %e, "Progress sample failed"),
                    }
                },
            }
        }
    }
}

/// Render seconds as `HhMMmSSs` for log lines.
pub fn format_eta(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}
