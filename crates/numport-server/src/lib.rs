//! numport server library
//!
//! HTTP API over the portability database.
//!
//! - **Lookup**: which operator serves a phone number, and whether it was ported
//! - **Import controls**: start, follow, cancel and reset the bulk import,
//!   delegating to [`numport_ingest::ImportController`]
//! - **Health**: database connectivity at `/health`
//!
//! Handlers live in vertical feature slices under [`features`], each with
//! its own commands and queries in the mediator request/handler shape.
//!
//! # Example
//!
//! ```no_run
//! use numport_server::{config::Config, create_router, db, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let state = AppState::new(pool, config.ingest.clone());
//!     let app = create_router(state, &config.cors);
//!     let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use numport_ingest::{ImportController, IngestConfig};
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;

pub use error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub controller: Arc<ImportController>,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, ingest: IngestConfig) -> Self {
        let controller = Arc::new(ImportController::new(db.clone(), ingest));
        Self { db, controller }
    }
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let feature_routes = features::router(features::FeatureState {
        db: state.db.clone(),
        controller: state.controller.clone(),
    });

    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .nest("/api/v1", feature_routes)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn health_check(State(state): State<AppState>) -> Response {
    match db::health_check(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected"
                })),
            )
                .into_response()
        },
    }
}
