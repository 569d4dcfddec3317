pub mod api;
pub mod boundaries;
pub mod data;
pub mod point;
pub mod units;

use axum::extract::Query;
use axum::extract::rejection::QueryRejection;

use crate::error::ApiError;

/// Unwrap a query extractor, reporting malformed parameters as a JSON 400.
pub(crate) fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
