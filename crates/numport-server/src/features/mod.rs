//! Feature modules implementing the numport API
//!
//! Each feature is a vertical slice with its own commands, queries and
//! routes. Commands and queries implement `mediator::Request` and are
//! executed by a plain `handle` function, so they can be tested without
//! HTTP.
//!
//! # Features
//!
//! - **lookup**: Operator lookup for a phone number, table counts
//! - **import**: Start, status, cancel and reset of the bulk import

pub mod import;
pub mod lookup;

use axum::Router;
use numport_ingest::ImportController;
use std::sync::Arc;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub db: sqlx::PgPool,
    /// Owns the single background import of this process
    pub controller: Arc<ImportController>,
}

/// Creates the API router with all feature routes mounted
///
/// - `/lookup` - Phone lookups
/// - `/import` - Import controls
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/lookup", lookup::lookup_routes().with_state(state.db.clone()))
        .nest("/import", import::import_routes().with_state(state.controller.clone()))
}
