use std::fmt::Write as _;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;

use crate::aggregator;
use crate::error::ApiError;
use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "country": state.country_name.as_ref(),
        "backend": state.store.backend(),
        "units": state.tree.len(),
        "lineage_rows": state.lineage.len(),
        "aggregate_cache_size": state.aggregate_cache.len(),
        "point_lookup_available": state.store.supports_point_lookup(),
        "observability": {
            "aggregate_requests_total": observability.aggregate_requests_total,
            "aggregate_cache_hits_total": observability.aggregate_cache_hits_total,
            "aggregate_cache_misses_total": observability.aggregate_cache_misses_total,
            "inherited_units_total": observability.inherited_units_total,
            "geometry_skipped_total": observability.geometry_skipped_total,
            "point_lookups_total": observability.point_lookups_total,
            "spatial_unavailable_total": observability.spatial_unavailable_total,
            "store_timeouts_total": observability.store_timeouts_total,
            "cache_invalidations_total": observability.cache_invalidations_total,
        }
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = render_prometheus_metrics(
        state.tree.len(),
        state.aggregate_cache.len(),
        state.store.supports_point_lookup(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

pub async fn invalidate_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = aggregator::invalidate_all(&state);
    tracing::info!(removed, "aggregate cache invalidated");
    Json(serde_json::json!({ "cleared": removed }))
}

fn write_metric(body: &mut String, name: &str, kind: &str, help: &str, value: u64) {
    let _ = writeln!(body, "# HELP {name} {help}");
    let _ = writeln!(body, "# TYPE {name} {kind}");
    let _ = writeln!(body, "{name} {value}");
}

fn render_prometheus_metrics(
    unit_count: usize,
    aggregate_cache_size: usize,
    point_lookup_available: bool,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    write_metric(
        &mut body,
        "atlas_admin_units",
        "gauge",
        "Administrative units loaded in the hierarchy.",
        unit_count as u64,
    );
    write_metric(
        &mut body,
        "atlas_aggregate_cache_size",
        "gauge",
        "Current number of cached aggregates.",
        aggregate_cache_size as u64,
    );
    write_metric(
        &mut body,
        "atlas_point_lookup_available",
        "gauge",
        "Whether spatial point lookup is available (1 or 0).",
        u64::from(point_lookup_available),
    );
    write_metric(
        &mut body,
        "atlas_aggregate_requests_total",
        "counter",
        "Total aggregate computations requested.",
        observability.aggregate_requests_total,
    );
    write_metric(
        &mut body,
        "atlas_aggregate_cache_hits_total",
        "counter",
        "Total aggregate requests served from cache.",
        observability.aggregate_cache_hits_total,
    );
    write_metric(
        &mut body,
        "atlas_aggregate_cache_misses_total",
        "counter",
        "Total aggregate requests computed from the store.",
        observability.aggregate_cache_misses_total,
    );
    write_metric(
        &mut body,
        "atlas_inherited_units_total",
        "counter",
        "Total districts back-filled from a pre-split ancestor.",
        observability.inherited_units_total,
    );
    write_metric(
        &mut body,
        "atlas_geometry_skipped_total",
        "counter",
        "Total features dropped because their geometry could not be cleaned.",
        observability.geometry_skipped_total,
    );
    write_metric(
        &mut body,
        "atlas_point_lookups_total",
        "counter",
        "Total point lookup requests.",
        observability.point_lookups_total,
    );
    write_metric(
        &mut body,
        "atlas_spatial_unavailable_total",
        "counter",
        "Total point lookups rejected for lack of spatial support.",
        observability.spatial_unavailable_total,
    );
    write_metric(
        &mut body,
        "atlas_store_timeouts_total",
        "counter",
        "Total store calls that exceeded the query timeout.",
        observability.store_timeouts_total,
    );
    write_metric(
        &mut body,
        "atlas_cache_invalidations_total",
        "counter",
        "Total explicit aggregate cache invalidations.",
        observability.cache_invalidations_total,
    );
    body
}

/// Serialize `payload` once and attach caching headers.
pub(crate) fn json_response<T: Serialize>(
    payload: &T,
    cache_control: &'static str,
    etag: Option<&str>,
) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(payload)?;
    Ok(json_bytes_response(Bytes::from(body), cache_control, etag))
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

pub(crate) fn not_modified_response(cache_control: &'static str, etag: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Ok(etag_header) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

pub(crate) fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, header};

    use super::{if_none_match_matches, render_prometheus_metrics};
    use crate::routes::tests::spawn_test_server;
    use crate::state::ObservabilitySnapshot;
    use crate::state::tests::sample_state;

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            aggregate_requests_total: 12,
            aggregate_cache_hits_total: 8,
            aggregate_cache_misses_total: 4,
            inherited_units_total: 2,
            geometry_skipped_total: 3,
            point_lookups_total: 5,
            spatial_unavailable_total: 1,
            store_timeouts_total: 0,
            cache_invalidations_total: 6,
        };

        let metrics = render_prometheus_metrics(27, 9, true, observability);

        assert!(metrics.contains("# HELP atlas_admin_units"));
        assert!(metrics.contains("# TYPE atlas_aggregate_requests_total counter"));
        assert!(metrics.contains("atlas_admin_units 27"));
        assert!(metrics.contains("atlas_aggregate_cache_size 9"));
        assert!(metrics.contains("atlas_point_lookup_available 1"));
        assert!(metrics.contains("atlas_aggregate_cache_hits_total 8"));
        assert!(metrics.contains("atlas_geometry_skipped_total 3"));
        assert!(metrics.contains("atlas_store_timeouts_total 0"));
        assert!(metrics.contains("atlas_cache_invalidations_total 6"));
    }

    #[test]
    fn if_none_match_supports_weak_and_multiple_etags() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("\"other\", W/\"boundaries-2-all\""),
        );
        assert!(if_none_match_matches(&headers, "\"boundaries-2-all\""));
        assert!(!if_none_match_matches(&headers, "\"boundaries-3-all\""));
        assert!(!if_none_match_matches(&HeaderMap::new(), "\"boundaries-2-all\""));
    }

    #[tokio::test]
    async fn health_metrics_and_invalidation_expose_expected_contract() {
        let (addr, server_handle) = spawn_test_server(sample_state()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .get(format!("{base_url}/api/metric-data?domain=issues&level=2"))
            .send()
            .await
            .expect("metric-data request")
            .error_for_status()
            .expect("metric-data status");

        let health = client
            .get(format!("{base_url}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(health.get("country").and_then(|v| v.as_str()), Some("Uganda"));
        assert_eq!(health.get("backend").and_then(|v| v.as_str()), Some("memory"));
        assert_eq!(health.get("aggregate_cache_size").and_then(|v| v.as_u64()), Some(1));
        assert_eq!(
            health
                .get("observability")
                .and_then(|v| v.get("aggregate_requests_total"))
                .and_then(|v| v.as_u64()),
            Some(1)
        );

        let cleared = client
            .post(format!("{base_url}/api/cache/invalidate"))
            .send()
            .await
            .expect("invalidate request")
            .error_for_status()
            .expect("invalidate status")
            .json::<serde_json::Value>()
            .await
            .expect("parse invalidate");
        assert_eq!(cleared.get("cleared").and_then(|v| v.as_u64()), Some(1));

        let metrics = client
            .get(format!("{base_url}/api/metrics"))
            .send()
            .await
            .expect("metrics request")
            .error_for_status()
            .expect("metrics status")
            .text()
            .await
            .expect("parse metrics text");

        assert!(metrics.contains("# TYPE atlas_aggregate_cache_size gauge"));
        assert!(metrics.contains("atlas_aggregate_cache_size 0"));
        assert!(metrics.contains("atlas_aggregate_cache_misses_total 1"));
        assert!(metrics.contains("atlas_cache_invalidations_total 1"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
