//! Common test utilities for numport-ingest integration tests
//!
//! Each test gets its own PostgreSQL container with migrations applied.
//! Run with `cargo test -p numport-ingest -- --ignored` (Docker required).

#![allow(dead_code)]

use anyhow::{Context, Result};
use numport_ingest::IngestConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("postgresql://postgres:postgres@{}:{}/postgres", host, port))
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,numport_ingest=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Small-scale config: chunks of 10 lines, batches of 4.
pub fn test_config(work_dir: &Path, expected_total: u64) -> IngestConfig {
    IngestConfig {
        source_file: work_dir.join("export.csv"),
        chunk_dir: work_dir.join("chunks"),
        chunk_size: 10,
        batch_size: 4,
        maintenance_every: 2,
        expected_total,
        heartbeat_interval_secs: 1,
        heartbeat_stale_after_secs: 30,
        reset_wait_secs: 5,
        ..IngestConfig::default()
    }
}

/// A well-formed 19-field export line for `phone`.
pub fn record_line(phone: &str) -> String {
    [
        "55",
        "1",
        "2020-01-01 10:00:00",
        phone,
        "3",
        "0123",
        "OP1",
        "C1",
        "0",
        "1",
        "ACTIVE",
        "2",
        "2020-01-02 00:00:00",
        "4",
        "0000-00-00 00:00:00",
        "5",
        "6",
        "7",
        "2021-01-01 00:00:00",
    ]
    .join(";")
}

/// Phones `11900000001..` so each line is distinguishable.
pub fn phone(i: u64) -> String {
    format!("{}", 11_900_000_000u64 + i)
}

pub fn write_source(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("export.csv");
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(&path, body).expect("write source");
    path
}

pub fn numbered_lines(count: u64) -> Vec<String> {
    (1..=count).map(|i| record_line(&phone(i))).collect()
}

pub async fn row_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM portability_history")
        .fetch_one(pool)
        .await
        .expect("count rows")
}
