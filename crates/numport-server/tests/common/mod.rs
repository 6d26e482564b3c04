//! Common test utilities for numport server integration tests
//!
//! Each test gets its own PostgreSQL container with migrations applied and
//! drives the router in-process with `tower::ServiceExt::oneshot`.
//! Run with `cargo test -p numport-server -- --ignored` (Docker required).

#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use numport_ingest::IngestConfig;
use numport_server::{config::CorsConfig, create_router, db, AppState};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tower::ServiceExt;
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

        db::run_migrations(&pool).await.context("Failed to run migrations")?;

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
            EnvFilter::new("info,numport_server=debug,numport_ingest=debug,sqlx=warn")
        }))
        .with_test_writer()
        .try_init();
}

/// Chunks of 10 lines so small fixture files exercise several chunks.
pub fn test_ingest_config(work_dir: &Path, expected_total: u64) -> IngestConfig {
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

pub fn test_app(pool: PgPool, ingest: IngestConfig) -> Router {
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    };
    create_router(AppState::new(pool, ingest), &cors)
}

/// A well-formed 19-field export line for `phone` routed to `target_spid`.
pub fn record_line(phone: &str, target_spid: &str) -> String {
    [
        "55",
        "1",
        "2020-01-01 10:00:00",
        phone,
        "3",
        target_spid,
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

pub fn write_source(dir: &Path, count: u64) -> std::path::PathBuf {
    let path = dir.join("export.csv");
    let body: String = (1..=count)
        .map(|i| record_line(&format!("{}", 11_900_000_000u64 + i), "0123") + "\n")
        .collect();
    std::fs::write(&path, body).expect("write source");
    path
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).expect("request")).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().uri(uri).method("POST");
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("json body")
    };
    (status, json)
}
