use atlas_shared::api::{DataQuery, MetricDataResponse, UnitRow};
use atlas_shared::join;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use tracing::debug;

use crate::aggregator::{aggregate_for, aggregate_key};
use crate::config::DATA_CACHE_CONTROL;
use crate::error::ApiError;
use crate::routes::api::json_response;
use crate::routes::boundaries::unit_features;
use crate::routes::parse_query;
use crate::state::AppState;

/// Statistics only, one row per unit at the requested level.
pub async fn get_metric_data(
    State(state): State<AppState>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = parse_query(query)?;
    let key = aggregate_key(&state, &query)?;
    let aggregate = aggregate_for(&state, key).await?;

    let data: Vec<UnitRow> = aggregate
        .set
        .iter()
        .filter_map(|(&unit_id, result)| {
            let unit = state.tree.get(unit_id)?;
            Some(UnitRow {
                unit_id,
                unit_name: unit.name.clone(),
                parent_id: unit.parent_id,
                level: unit.level,
                result: result.clone(),
            })
        })
        .collect();

    let response = MetricDataResponse {
        count: data.len(),
        data,
        year: aggregate.year,
    };
    json_response(&response, DATA_CACHE_CONTROL, None)
}

/// Statistics joined onto geometry server-side.
pub async fn get_aggregated(
    State(state): State<AppState>,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let query = parse_query(query)?;
    let key = aggregate_key(&state, &query)?;
    let aggregate = aggregate_for(&state, key).await?;
    let features = unit_features(&state, key.level, key.parent_id).await?;

    let outcome = join(features, &aggregate.set, None);
    if outcome.skipped > 0 {
        state
            .observability
            .record_geometry_skipped(outcome.skipped as u64);
    }
    debug!(
        domain = %key.domain,
        level = %key.level,
        features = outcome.collection.len(),
        skipped = outcome.skipped,
        unmatched_stats = outcome.unmatched_stats,
        "aggregated collection joined"
    );
    json_response(&outcome.collection, DATA_CACHE_CONTROL, None)
}
