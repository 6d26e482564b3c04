//! Lookup API routes
//!
//! - `POST /api/v1/lookup` - Current and original operator of a phone number
//! - `GET /api/v1/lookup/counts` - Row counts of the reference and history tables

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sqlx::PgPool;

use super::queries::{
    LookupPhoneError, LookupPhoneQuery, TableCountsError, TableCountsQuery,
};
use crate::error::AppError;

pub fn lookup_routes() -> Router<PgPool> {
    Router::new()
        .route("/", post(lookup_phone))
        .route("/counts", get(table_counts))
}

/// Look up a phone number
///
/// # Request Body
///
/// ```json
/// { "phone": "(11) 98765-4321" }
/// ```
///
/// # Response
///
/// - `200 OK` - Lookup result, also when no operator is known
/// - `400 Bad Request` - Not a 10 or 11 digit number
/// - `500 Internal Server Error` - Database error
#[tracing::instrument(skip(pool, query))]
async fn lookup_phone(
    State(pool): State<PgPool>,
    Json(query): Json<LookupPhoneQuery>,
) -> Result<Response, AppError> {
    let response = super::queries::lookup_phone::handle(pool, query).await?;

    tracing::debug!(
        ddd = %response.ddd,
        prefix = %response.prefix,
        ported = response.ported,
        "Phone looked up via API"
    );

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[tracing::instrument(skip(pool))]
async fn table_counts(State(pool): State<PgPool>) -> Result<Response, AppError> {
    let response = super::queries::table_counts::handle(pool, TableCountsQuery::default()).await?;
    Ok((StatusCode::OK, Json(response)).into_response())
}

impl From<LookupPhoneError> for AppError {
    fn from(err: LookupPhoneError) -> Self {
        match err {
            LookupPhoneError::InvalidPhone(e) => AppError::Numport(e),
            LookupPhoneError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<TableCountsError> for AppError {
    fn from(err: TableCountsError) -> Self {
        match err {
            TableCountsError::Ingest(e) => AppError::Ingest(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_phone_maps_to_bad_request() {
        let err = LookupPhoneError::InvalidPhone(numport_common::NumportError::invalid_phone(
            "12",
            "too short",
        ));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_routes_structure() {
        let router = lookup_routes();
        assert!(format!("{:?}", router).contains("Router"));
    }
}
