//! GeoJSON wire types for boundary and joined collections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::AggregateResult;
use crate::geometry::BBox;
use crate::level::AdminLevel;
use crate::unit::AdminUnit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub unit_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub level: AdminLevel,
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Present on joined features that matched a statistic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<AggregateResult>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_data: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub id: i64,
    pub geometry: Value,
    pub properties: FeatureProperties,
}

impl Feature {
    /// Geometry-only feature for a unit. Units without geometry carry a null
    /// geometry, which the cleaning step drops.
    pub fn from_unit(unit: &AdminUnit) -> Self {
        Self {
            id: unit.id,
            geometry: unit.geometry.clone().unwrap_or(Value::Null),
            properties: FeatureProperties {
                unit_id: unit.id,
                name: unit.name.clone(),
                code: unit.code.clone(),
                level: unit.level,
                parent_id: unit.parent_id,
                stats: None,
                no_data: false,
            },
        }
    }

    pub fn unit_id(&self) -> i64 {
        self.properties.unit_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub unit_count: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub metadata: CollectionMetadata,
}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn find(&self, unit_id: i64) -> Option<&Feature> {
        self.features.iter().find(|f| f.unit_id() == unit_id)
    }
}
