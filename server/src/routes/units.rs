use atlas_shared::api::{UnitDetail, UnitSummary};
use axum::Json;
use axum::extract::{Path, State};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UnitDetail>, ApiError> {
    let unit = state.tree.require(id)?;
    Ok(Json(UnitDetail {
        unit: UnitSummary::from(unit),
        path: state
            .tree
            .path(id)
            .into_iter()
            .map(UnitSummary::from)
            .collect(),
        child_count: state.tree.children(id).count(),
    }))
}

#[cfg(test)]
mod tests {
    use atlas_shared::api::UnitDetail;
    use reqwest::StatusCode;

    use crate::routes::tests::spawn_test_server;
    use crate::state::tests::sample_state;

    #[tokio::test]
    async fn unit_detail_includes_breadcrumb_path() {
        let (addr, server_handle) = spawn_test_server(sample_state()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let detail: UnitDetail = client
            .get(format!("{base_url}/api/units/1000"))
            .send()
            .await
            .expect("unit request")
            .error_for_status()
            .expect("unit status")
            .json()
            .await
            .expect("parse unit");
        assert_eq!(detail.unit.name, "Gulu Central");
        let path: Vec<i64> = detail.path.iter().map(|u| u.id).collect();
        assert_eq!(path, vec![1, 10, 100, 1000]);
        assert_eq!(detail.child_count, 2);

        let missing = client
            .get(format!("{base_url}/api/units/5"))
            .send()
            .await
            .expect("unit request");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        server_handle.abort();
        let _ = server_handle.await;
    }
}
