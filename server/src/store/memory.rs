use std::collections::HashMap;
use std::path::Path;

use atlas_shared::{
    AdminLevel, AdminUnit, DemographicsRecord, DistrictLineage, Election, ElectionResult,
    IssueRecord,
};
use chrono::Datelike;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::spatial::SpatialIndex;

/// Denormalized seed dataset: the full hierarchy with geometry plus every
/// metric table, as one JSON document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub units: Vec<AdminUnit>,
    #[serde(default)]
    pub elections: Vec<Election>,
    #[serde(default)]
    pub results: Vec<ElectionResult>,
    #[serde(default)]
    pub demographics: Vec<DemographicsRecord>,
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub lineage: Vec<DistrictLineage>,
}

impl Dataset {
    pub fn from_json(raw: &str) -> Result<Self, ApiError> {
        serde_json::from_str(raw).map_err(|e| ApiError::Seed(e.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, ApiError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ApiError::Seed(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }
}

pub struct MemoryStore {
    units: Vec<AdminUnit>,
    geometry: HashMap<i64, Value>,
    elections: HashMap<i64, Election>,
    results: HashMap<i64, Vec<ElectionResult>>,
    demographics: Vec<DemographicsRecord>,
    issues: Vec<IssueRecord>,
    lineage: Vec<DistrictLineage>,
    spatial: SpatialIndex,
}

impl MemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        let Dataset {
            mut units,
            elections,
            results,
            demographics,
            issues,
            lineage,
        } = dataset;

        let mut geometry = HashMap::new();
        let mut levels: HashMap<i64, AdminLevel> = HashMap::new();
        for unit in &mut units {
            levels.insert(unit.id, unit.level);
            if let Some(raw) = unit.geometry.take() {
                geometry.insert(unit.id, raw);
            }
        }

        let (spatial, skipped) = SpatialIndex::build(
            geometry
                .iter()
                .filter_map(|(id, raw)| levels.get(id).map(|&level| (*id, level, raw))),
        );
        if skipped > 0 {
            tracing::warn!(skipped, "seed geometries excluded from the spatial index");
        }
        tracing::debug!(indexed = spatial.len(), "spatial index built");

        let mut by_election: HashMap<i64, Vec<ElectionResult>> = HashMap::new();
        for result in results {
            by_election.entry(result.election_id).or_default().push(result);
        }

        Self {
            units,
            geometry,
            elections: elections.into_iter().map(|e| (e.id, e)).collect(),
            results: by_election,
            demographics,
            issues,
            lineage,
            spatial,
        }
    }

    /// Units without geometry; geometry is served separately.
    pub fn units(&self) -> Vec<AdminUnit> {
        self.units.clone()
    }

    pub fn geometries(&self, ids: &[i64]) -> HashMap<i64, Value> {
        ids.iter()
            .filter_map(|id| self.geometry.get(id).map(|raw| (*id, raw.clone())))
            .collect()
    }

    pub fn lineage(&self) -> Vec<DistrictLineage> {
        self.lineage.clone()
    }

    pub fn elections(&self) -> Vec<Election> {
        let mut elections: Vec<Election> = self.elections.values().cloned().collect();
        elections.sort_by_key(|e| e.id);
        elections
    }

    pub fn election(&self, id: i64) -> Option<Election> {
        self.elections.get(&id).cloned()
    }

    pub fn election_results(&self, election_id: i64) -> Vec<ElectionResult> {
        self.results.get(&election_id).cloned().unwrap_or_default()
    }

    /// Census rows for `year`, or for the latest year when `None`.
    pub fn demographics(&self, year: Option<i32>) -> Vec<DemographicsRecord> {
        let Some(year) = year.or_else(|| self.demographics.iter().map(|r| r.year).max()) else {
            return Vec::new();
        };
        self.demographics
            .iter()
            .filter(|r| r.year == year)
            .cloned()
            .collect()
    }

    pub fn issues(&self, year: Option<i32>) -> Vec<IssueRecord> {
        self.issues
            .iter()
            .filter(|i| year.is_none_or(|y| i.date.year() == y))
            .cloned()
            .collect()
    }

    pub fn point_lookup(&self, lng: f64, lat: f64, level: Option<AdminLevel>) -> Vec<i64> {
        self.spatial.locate(lng, lat, level)
    }
}
