use atlas_shared::api::BoundaryQuery;
use atlas_shared::{AdminLevel, Feature, boundary_collection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::config::BOUNDARY_CACHE_CONTROL;
use crate::error::ApiError;
use crate::routes::api::{if_none_match_matches, json_response, not_modified_response};
use crate::routes::parse_query;
use crate::state::AppState;

/// Geometry-only features for one level, optionally under one parent.
pub async fn get_boundaries(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<BoundaryQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = parse_query(query)?;
    let level = AdminLevel::from_number(query.level)?;
    if let Some(parent_id) = query.parent_id {
        state.tree.require(parent_id)?;
    }

    // Geometry is immutable for the life of the process.
    let etag = boundaries_etag(level, query.parent_id);
    if if_none_match_matches(&headers, &etag) {
        return Ok(not_modified_response(BOUNDARY_CACHE_CONTROL, &etag));
    }

    let features = unit_features(&state, level, query.parent_id).await?;
    let collection = boundary_collection(features);
    if collection.metadata.skipped > 0 {
        state
            .observability
            .record_geometry_skipped(collection.metadata.skipped as u64);
        tracing::debug!(
            level = %level,
            skipped = collection.metadata.skipped,
            "boundary features dropped during cleaning"
        );
    }
    json_response(&collection, BOUNDARY_CACHE_CONTROL, Some(&etag))
}

/// Features for the units at `level` under `parent_id`, with raw geometry
/// fetched from the store.
pub(crate) async fn unit_features(
    state: &AppState,
    level: AdminLevel,
    parent_id: Option<i64>,
) -> Result<Vec<Feature>, ApiError> {
    let units = state.tree.units_within(level, parent_id)?;
    let ids: Vec<i64> = units.iter().map(|unit| unit.id).collect();
    let mut geometry = state.timed(state.store.geometries(&ids)).await?;

    Ok(units
        .into_iter()
        .map(|unit| {
            let mut feature = Feature::from_unit(unit);
            if let Some(raw) = geometry.remove(&unit.id) {
                feature.geometry = raw;
            }
            feature
        })
        .collect())
}

fn boundaries_etag(level: AdminLevel, parent_id: Option<i64>) -> String {
    match parent_id {
        Some(parent_id) => format!("\"boundaries-{}-{parent_id}\"", level.number()),
        None => format!("\"boundaries-{}-all\"", level.number()),
    }
}
