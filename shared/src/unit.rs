use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::level::AdminLevel;

/// A node of the administrative hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUnit {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub level: AdminLevel,
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Raw GeoJSON `Polygon` / `MultiPolygon` geometry, uncleaned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_voters: Option<u64>,
}

/// Per-level ancestor ids of one unit. Slot `level.index()` holds the
/// ancestor at that level (the unit itself at its own level).
pub type AncestorRow = [Option<i64>; 5];

/// Immutable, validated administrative forest.
///
/// Built once per process. Besides id and children lookups it materializes an
/// ancestor closure table so that grouping records by their ancestor at any
/// level is a single array read.
#[derive(Debug, Default)]
pub struct AdminTree {
    units: Vec<AdminUnit>,
    index: HashMap<i64, usize>,
    children: Vec<Vec<usize>>,
    by_level: [Vec<usize>; 5],
    ancestors: Vec<AncestorRow>,
}

impl AdminTree {
    pub fn new(units: Vec<AdminUnit>) -> Result<Self> {
        let mut index = HashMap::with_capacity(units.len());
        for (idx, unit) in units.iter().enumerate() {
            if index.insert(unit.id, idx).is_some() {
                return Err(AtlasError::InvalidTree(format!(
                    "duplicate unit id {}",
                    unit.id
                )));
            }
        }

        let mut children = vec![Vec::new(); units.len()];
        let mut by_level: [Vec<usize>; 5] = Default::default();

        for (idx, unit) in units.iter().enumerate() {
            by_level[unit.level.index()].push(idx);

            match (unit.level.parent(), unit.parent_id) {
                (None, None) => {}
                (None, Some(parent_id)) => {
                    return Err(AtlasError::InvalidTree(format!(
                        "level-1 unit {} has parent {parent_id}",
                        unit.id
                    )));
                }
                (Some(_), None) => {
                    return Err(AtlasError::InvalidTree(format!(
                        "unit {} at level {} has no parent",
                        unit.id,
                        unit.level.number()
                    )));
                }
                (Some(expected), Some(parent_id)) => {
                    let Some(&parent_idx) = index.get(&parent_id) else {
                        return Err(AtlasError::InvalidTree(format!(
                            "unit {} references missing parent {parent_id}",
                            unit.id
                        )));
                    };
                    if units[parent_idx].level != expected {
                        return Err(AtlasError::InvalidTree(format!(
                            "unit {} at level {} has parent {parent_id} at level {}",
                            unit.id,
                            unit.level.number(),
                            units[parent_idx].level.number()
                        )));
                    }
                    children[parent_idx].push(idx);
                }
            }
        }

        // Parents always sit one level up, so filling rows level by level
        // guarantees the parent row is complete before its children read it.
        let mut ancestors: Vec<AncestorRow> = vec![[None; 5]; units.len()];
        for level in AdminLevel::ALL {
            for &idx in &by_level[level.index()] {
                let mut row = match units[idx].parent_id.and_then(|p| index.get(&p)) {
                    Some(&parent_idx) => ancestors[parent_idx],
                    None => [None; 5],
                };
                row[level.index()] = Some(units[idx].id);
                ancestors[idx] = row;
            }
        }

        for ids in children.iter_mut() {
            ids.sort_by_key(|&idx| units[idx].id);
        }
        for ids in by_level.iter_mut() {
            ids.sort_by_key(|&idx| units[idx].id);
        }

        Ok(Self {
            units,
            index,
            children,
            by_level,
            ancestors,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&AdminUnit> {
        self.index.get(&id).map(|&idx| &self.units[idx])
    }

    pub fn require(&self, id: i64) -> Result<&AdminUnit> {
        self.get(id)
            .ok_or_else(|| AtlasError::not_found("admin unit", id))
    }

    /// Units at `level`, ordered by id.
    pub fn units_at(&self, level: AdminLevel) -> impl Iterator<Item = &AdminUnit> + '_ {
        self.by_level[level.index()]
            .iter()
            .map(|&idx| &self.units[idx])
    }

    pub fn children(&self, id: i64) -> impl Iterator<Item = &AdminUnit> + '_ {
        self.index
            .get(&id)
            .map(|&idx| self.children[idx].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&idx| &self.units[idx])
    }

    pub fn ancestors(&self, id: i64) -> Option<&AncestorRow> {
        self.index.get(&id).map(|&idx| &self.ancestors[idx])
    }

    /// Ancestor of `id` at `level`; the unit itself when `level` is its own.
    pub fn ancestor_at(&self, id: i64, level: AdminLevel) -> Option<i64> {
        self.ancestors(id).and_then(|row| row[level.index()])
    }

    /// True when `ancestor_id` lies on the path from the root to `id` (inclusive).
    pub fn is_descendant_of(&self, id: i64, ancestor_id: i64) -> bool {
        let Some(ancestor) = self.get(ancestor_id) else {
            return false;
        };
        self.ancestor_at(id, ancestor.level) == Some(ancestor_id)
    }

    /// Units at `level`, restricted to descendants of `parent_id` when given.
    pub fn units_within(
        &self,
        level: AdminLevel,
        parent_id: Option<i64>,
    ) -> Result<Vec<&AdminUnit>> {
        let Some(parent_id) = parent_id else {
            return Ok(self.units_at(level).collect());
        };
        let parent = self.require(parent_id)?;
        if parent.level >= level {
            return Ok(Vec::new());
        }
        Ok(self
            .units_at(level)
            .filter(|unit| self.is_descendant_of(unit.id, parent_id))
            .collect())
    }

    /// Root-to-unit chain, inclusive.
    pub fn path(&self, id: i64) -> Vec<&AdminUnit> {
        self.ancestors(id)
            .map(|row| row.iter().flatten().filter_map(|&a| self.get(a)).collect())
            .unwrap_or_default()
    }

    /// Registered voters for a unit: its own figure when recorded, otherwise the
    /// sum over its children. `None` when nothing below carries a figure.
    pub fn registered_voters(&self, id: i64) -> Option<u64> {
        self.index.get(&id).and_then(|&idx| self.roll_up_voters(idx))
    }

    fn roll_up_voters(&self, idx: usize) -> Option<u64> {
        if let Some(own) = self.units[idx].registered_voters {
            return Some(own);
        }
        self.children[idx]
            .iter()
            .filter_map(|&child| self.roll_up_voters(child))
            .reduce(|a, b| a + b)
    }
}
