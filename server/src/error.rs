//! HTTP error mapping.

use atlas_shared::AtlasError;
use atlas_shared::api::ErrorBody;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Hint returned with spatial failures so the client switches to
/// boundary-based navigation.
pub const SPATIAL_FALLBACK: &str = "boundary_navigation";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] AtlasError),

    #[error("database error: {0}")]
    Database(#[from] sqlx_core::Error),

    #[error("seed dataset error: {0}")]
    Seed(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Engine(err) => match err {
                AtlasError::InvalidLevel(_) => (StatusCode::BAD_REQUEST, "INVALID_LEVEL"),
                AtlasError::InvalidDomain(_) => (StatusCode::BAD_REQUEST, "INVALID_DOMAIN"),
                AtlasError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                AtlasError::GeometryParse { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "GEOMETRY_PARSE")
                }
                AtlasError::SpatialIndexUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SPATIAL_INDEX_UNAVAILABLE")
                }
                AtlasError::PrefetchFailure { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PREFETCH_FAILURE")
                }
                AtlasError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                AtlasError::InvalidTree(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_TREE"),
            },
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Seed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SEED_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, code, "request failed");
        }
        let fallback = matches!(self, ApiError::Engine(AtlasError::SpatialIndexUnavailable))
            .then(|| SPATIAL_FALLBACK.to_string());

        let body = ErrorBody {
            error: self.to_string(),
            code: code.to_string(),
            fallback,
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON error: {err}"))
    }
}
