use axum::Router;
use axum::http::Method;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/boundaries", get(routes::boundaries::get_boundaries))
        .route("/api/metric-data", get(routes::data::get_metric_data))
        .route("/api/aggregated", get(routes::data::get_aggregated))
        .route("/api/point-lookup", get(routes::point::point_lookup))
        .route("/api/units/{id}", get(routes::units::get_unit))
        .route("/api/cache/invalidate", post(routes::api::invalidate_cache))
        .route("/api/health", get(routes::api::health))
        .route("/api/metrics", get(routes::api::metrics))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
