use atlas_shared::api::{PointLookupResponse, PointQuery, UnitSummary};
use atlas_shared::{AdminLevel, AtlasError};
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};

use crate::error::ApiError;
use crate::routes::parse_query;
use crate::state::AppState;

/// Units containing a WGS84 point, coarsest first.
pub async fn point_lookup(
    State(state): State<AppState>,
    query: Result<Query<PointQuery>, QueryRejection>,
) -> Result<Json<PointLookupResponse>, ApiError> {
    let query = parse_query(query)?;
    state.observability.record_point_lookup();

    if !(query.lng.is_finite() && (-180.0..=180.0).contains(&query.lng))
        || !(query.lat.is_finite() && (-90.0..=90.0).contains(&query.lat))
    {
        return Err(ApiError::BadRequest(format!(
            "coordinates out of range: lng={}, lat={}",
            query.lng, query.lat
        )));
    }
    let level = query.level.map(AdminLevel::from_number).transpose()?;

    if !state.store.supports_point_lookup() {
        state.observability.record_spatial_unavailable();
        return Err(AtlasError::SpatialIndexUnavailable.into());
    }

    let ids = state
        .timed(state.store.point_lookup(query.lng, query.lat, level))
        .await?;
    let units = ids
        .into_iter()
        .filter_map(|id| state.tree.get(id))
        .map(UnitSummary::from)
        .collect();
    Ok(Json(PointLookupResponse::from_units(units)))
}

#[cfg(test)]
mod tests {
    use atlas_client::{ClientConfig, HttpSource, MapSession, NavOutcome};
    use atlas_shared::AdminLevel;
    use atlas_shared::api::PointLookupResponse;
    use reqwest::StatusCode;

    use crate::routes::tests::spawn_test_server;
    use crate::state::tests::sample_state;

    #[tokio::test]
    async fn point_lookup_returns_the_full_chain() {
        let (addr, server_handle) = spawn_test_server(sample_state()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let response: PointLookupResponse = client
            .get(format!("{base_url}/api/point-lookup?lng=31.75&lat=1.25"))
            .send()
            .await
            .expect("point request")
            .error_for_status()
            .expect("point status")
            .json()
            .await
            .expect("parse lookup");
        let ids: Vec<i64> = response.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 11, 110, 1100, 11001]);
        assert_eq!(response.primary.map(|p| p.id), Some(11001));

        let districts: PointLookupResponse = client
            .get(format!("{base_url}/api/point-lookup?lng=31.75&lat=1.25&level=2"))
            .send()
            .await
            .expect("point request")
            .json()
            .await
            .expect("parse lookup");
        assert_eq!(districts.primary.map(|p| p.name), Some("Omoro".to_string()));

        let outside: PointLookupResponse = client
            .get(format!("{base_url}/api/point-lookup?lng=0&lat=0"))
            .send()
            .await
            .expect("point request")
            .json()
            .await
            .expect("parse lookup");
        assert!(outside.units.is_empty());
        assert!(outside.primary.is_none());

        let response = client
            .get(format!("{base_url}/api/point-lookup?lng=500&lat=0"))
            .send()
            .await
            .expect("point request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn session_click_falls_back_to_the_containing_district() {
        let (addr, server_handle) = spawn_test_server(sample_state()).await;
        let config = ClientConfig::with_base_url(format!("http://{addr}"));
        let session = MapSession::new(HttpSource::new(config.clone()), config);

        let outcome = session.navigate_to_point(31.75, 1.25).await.expect("point navigation");
        assert!(matches!(
            outcome,
            NavOutcome::Navigated(ref frame)
                if frame.region_id == Some(11) && frame.level == AdminLevel::Constituency
        ));
        assert_eq!(session.breadcrumbs().await.len(), 2);

        server_handle.abort();
        let _ = server_handle.await;
    }
}
