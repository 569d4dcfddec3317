//! In-memory [`DataSource`] for session tests.
//!
//! Three districts (10, 11, 12) side by side as unit squares along the
//! equator, each with two constituencies splitting it in half. District 12
//! has no data.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use atlas_shared::api::{MetricDataResponse, PointLookupResponse, UnitDetail, UnitRow, UnitSummary};
use atlas_shared::{
    AdminLevel, AdminUnit, AggregateResult, AtlasError, Domain, Feature, FeatureCollection,
    boundary_collection,
};
use serde_json::{Value, json};

use crate::error::{ClientError, Result};
use crate::source::DataSource;

pub(crate) const DISTRICTS: [i64; 3] = [10, 11, 12];

#[derive(Default)]
pub(crate) struct FakeSource {
    pub boundary_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub point_calls: AtomicUsize,
    /// Level argument of every `point_lookup` call.
    pub point_levels: Mutex<Vec<Option<AdminLevel>>>,
    pub failing_parents: HashSet<i64>,
    pub spatial: bool,
    /// Consumed one per `metric_data` call.
    pub stats_delays: Mutex<VecDeque<Duration>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            spatial: true,
            ..Self::default()
        }
    }

    pub fn boundary_calls(&self) -> usize {
        self.boundary_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn point_calls(&self) -> usize {
        self.point_calls.load(Ordering::SeqCst)
    }

    pub fn delay_next_stats(&self, delay: Duration) {
        self.stats_delays.lock().expect("delays").push_back(delay);
    }

    fn units(level: AdminLevel, parent_id: Option<i64>) -> Vec<AdminUnit> {
        match level {
            AdminLevel::District => DISTRICTS
                .iter()
                .filter(|_| parent_id.is_none_or(|p| p == 1))
                .map(|&id| unit(id, level, Some(1), rect((id - 10) as f64, 0.0, 1.0, 1.0)))
                .collect(),
            AdminLevel::Constituency => DISTRICTS
                .iter()
                .filter(|&&d| parent_id.is_none_or(|p| p == d))
                .flat_map(|&d| {
                    let x0 = (d - 10) as f64;
                    [
                        unit(d * 10, level, Some(d), rect(x0, 0.0, 0.5, 1.0)),
                        unit(d * 10 + 1, level, Some(d), rect(x0 + 0.5, 0.0, 0.5, 1.0)),
                    ]
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn rect(x0: f64, y0: f64, w: f64, h: f64) -> Value {
    json!({
        "type": "Polygon",
        "coordinates": [[[x0, y0], [x0 + w, y0], [x0 + w, y0 + h], [x0, y0 + h], [x0, y0]]]
    })
}

fn unit(id: i64, level: AdminLevel, parent_id: Option<i64>, geometry: Value) -> AdminUnit {
    AdminUnit {
        id,
        name: format!("Unit {id}"),
        code: None,
        level,
        parent_id,
        geometry: Some(geometry),
        registered_voters: None,
    }
}

fn has_data(id: i64) -> bool {
    id != 12 && id / 10 != 12
}

impl DataSource for FakeSource {
    async fn boundaries(
        &self,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> Result<FeatureCollection> {
        self.boundary_calls.fetch_add(1, Ordering::SeqCst);
        if parent_id.is_some_and(|p| self.failing_parents.contains(&p)) {
            return Err(ClientError::from_status(500, "storage offline"));
        }
        let features: Vec<Feature> = Self::units(level, parent_id)
            .iter()
            .map(Feature::from_unit)
            .collect();
        Ok(boundary_collection(features))
    }

    async fn metric_data(
        &self,
        _domain: Domain,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> Result<MetricDataResponse> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.stats_delays.lock().expect("delays").pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let data: Vec<UnitRow> = Self::units(level, parent_id)
            .into_iter()
            .map(|u| {
                let result = if has_data(u.id) {
                    AggregateResult {
                        total_count: u.id as u64,
                        record_count: 1,
                        ..AggregateResult::default()
                    }
                } else {
                    AggregateResult::default()
                };
                UnitRow {
                    unit_id: u.id,
                    unit_name: u.name,
                    parent_id: u.parent_id,
                    level: u.level,
                    result,
                }
            })
            .collect();
        Ok(MetricDataResponse {
            count: data.len(),
            data,
            year: None,
        })
    }

    async fn unit(&self, id: i64) -> Result<UnitDetail> {
        let level = if id < 100 {
            AdminLevel::District
        } else {
            AdminLevel::Constituency
        };
        let summary = UnitSummary {
            id,
            name: format!("Unit {id}"),
            code: None,
            level,
            parent_id: Some(if id < 100 { 1 } else { id / 10 }),
        };
        Ok(UnitDetail {
            path: vec![summary.clone()],
            unit: summary,
            child_count: 2,
        })
    }

    async fn point_lookup(
        &self,
        lng: f64,
        lat: f64,
        level: Option<AdminLevel>,
    ) -> Result<PointLookupResponse> {
        self.point_calls.fetch_add(1, Ordering::SeqCst);
        self.point_levels.lock().expect("levels").push(level);
        if !self.spatial {
            return Err(AtlasError::SpatialIndexUnavailable.into());
        }
        // Same shape as the server: the whole containing chain, finest last.
        let chain: Vec<UnitSummary> = [AdminLevel::District, AdminLevel::Constituency]
            .into_iter()
            .filter(|&l| level.is_none_or(|wanted| wanted == l))
            .flat_map(|l| Self::units(l, None))
            .filter(|u| {
                let (x0, width) = if u.level == AdminLevel::District {
                    ((u.id - 10) as f64, 1.0)
                } else {
                    ((u.id / 10 - 10) as f64 + (u.id % 10) as f64 * 0.5, 0.5)
                };
                lng >= x0 && lng < x0 + width && (0.0..1.0).contains(&lat)
            })
            .map(|u| UnitSummary::from(&u))
            .collect();
        Ok(PointLookupResponse::from_units(chain))
    }
}
