//! Where a session gets its geometry and statistics from.

use std::future::Future;

use atlas_shared::api::{
    BoundaryQuery, DataQuery, MetricDataResponse, PointLookupResponse, PointQuery, UnitDetail,
};
use atlas_shared::{AdminLevel, AtlasError, Domain, FeatureCollection};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::retry::with_retry;

/// The four server interfaces a session consumes.
pub trait DataSource: Send + Sync + 'static {
    fn boundaries(
        &self,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> impl Future<Output = Result<FeatureCollection>> + Send;

    fn metric_data(
        &self,
        domain: Domain,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> impl Future<Output = Result<MetricDataResponse>> + Send;

    fn unit(&self, id: i64) -> impl Future<Output = Result<UnitDetail>> + Send;

    fn point_lookup(
        &self,
        lng: f64,
        lat: f64,
        level: Option<AdminLevel>,
    ) -> impl Future<Output = Result<PointLookupResponse>> + Send;
}

const NO_QUERY: [(&str, &str); 0] = [];

/// Query string for a statistics request.
pub fn data_query(domain: Domain, level: AdminLevel, parent_id: Option<i64>) -> DataQuery {
    let (entity_id, year) = match domain {
        Domain::Elections { election_id } => (Some(election_id), None),
        Domain::Demographics { year } | Domain::Issues { year } => (None, year),
    };
    DataQuery {
        domain: domain.kind().as_str().to_string(),
        entity_id,
        level: i64::from(level.number()),
        parent_id,
        year,
    }
}

/// [`DataSource`] over the atlas HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpSource {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn get_json<Q, T>(&self, path: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.config.base_url);
        with_retry(
            path,
            self.config.request_timeout,
            self.config.retries,
            || self.fetch_once(&url, query),
        )
        .await
    }

    async fn fetch_once<Q, T>(&self, url: &str, query: &Q) -> Result<T>
    where
        Q: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::from_status(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

impl DataSource for HttpSource {
    async fn boundaries(
        &self,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> Result<FeatureCollection> {
        let query = BoundaryQuery {
            level: i64::from(level.number()),
            parent_id,
        };
        self.get_json("/api/boundaries", &query).await
    }

    async fn metric_data(
        &self,
        domain: Domain,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> Result<MetricDataResponse> {
        let query = data_query(domain, level, parent_id);
        self.get_json("/api/metric-data", &query).await
    }

    async fn unit(&self, id: i64) -> Result<UnitDetail> {
        self.get_json(&format!("/api/units/{id}"), &NO_QUERY).await
    }

    async fn point_lookup(
        &self,
        lng: f64,
        lat: f64,
        level: Option<AdminLevel>,
    ) -> Result<PointLookupResponse> {
        let query = PointQuery {
            lng,
            lat,
            level: level.map(|l| i64::from(l.number())),
        };
        match self.get_json("/api/point-lookup", &query).await {
            Err(e) if e.is_spatial_unavailable() => Err(AtlasError::SpatialIndexUnavailable.into()),
            other => other,
        }
    }
}
