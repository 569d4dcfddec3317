//! Request and response bodies shared by the HTTP server and the client.

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateResult, AggregateSet};
use crate::level::AdminLevel;
use crate::unit::AdminUnit;

/// Query string of `/api/boundaries`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryQuery {
    pub level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

/// Query string of `/api/metric-data` and `/api/aggregated`.
///
/// Levels stay loosely typed so that an out-of-range value reaches the engine
/// and is reported as an invalid level rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuery {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
    pub level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointQuery {
    pub lng: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
}

/// One unit's statistics in a `/api/metric-data` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRow {
    pub unit_id: i64,
    pub unit_name: String,
    pub parent_id: Option<i64>,
    pub level: AdminLevel,
    #[serde(flatten)]
    pub result: AggregateResult,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDataResponse {
    pub count: usize,
    pub data: Vec<UnitRow>,
    /// Census year actually used when the request named none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl MetricDataResponse {
    pub fn into_stats(self) -> AggregateSet {
        self.data
            .into_iter()
            .map(|row| (row.unit_id, row.result))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub level: AdminLevel,
    pub parent_id: Option<i64>,
}

impl From<&AdminUnit> for UnitSummary {
    fn from(unit: &AdminUnit) -> Self {
        Self {
            id: unit.id,
            name: unit.name.clone(),
            code: unit.code.clone(),
            level: unit.level,
            parent_id: unit.parent_id,
        }
    }
}

/// `/api/units/{id}`: the unit, its root-to-unit path and child count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDetail {
    #[serde(flatten)]
    pub unit: UnitSummary,
    pub path: Vec<UnitSummary>,
    pub child_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointLookupResponse {
    /// Every unit containing the point, coarsest first.
    pub units: Vec<UnitSummary>,
    /// The finest containing unit.
    pub primary: Option<UnitSummary>,
}

impl PointLookupResponse {
    pub fn from_units(mut units: Vec<UnitSummary>) -> Self {
        units.sort_by_key(|u| (u.level, u.id));
        let primary = units.last().cloned();
        Self { units, primary }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}
