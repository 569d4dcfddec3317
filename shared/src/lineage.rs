use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateSet;
use crate::level::AdminLevel;
use crate::unit::AdminTree;

/// Records that `current_unit_id` was carved out of `parent_unit_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictLineage {
    pub current_unit_id: i64,
    pub parent_unit_id: i64,
    pub split_year: i32,
}

/// Back-fill districts created by a split with their pre-split ancestor's
/// aggregate.
///
/// Only meaningful for the parent-less district view; any other call is a
/// no-op. A district with data of its own is left untouched. Lineage rows are
/// tried from the most recent split backwards and the first ancestor holding
/// its own data wins. Inherited values are never re-inherited. Returns the
/// number of districts that were filled.
pub fn resolve_inheritance(
    tree: &AdminTree,
    level: AdminLevel,
    parent_id: Option<i64>,
    lineage: &[DistrictLineage],
    results: &mut AggregateSet,
) -> usize {
    if level != AdminLevel::District || parent_id.is_some() || lineage.is_empty() {
        return 0;
    }

    let mut missing: Vec<i64> = results
        .iter()
        .filter(|(_, result)| !result.has_data())
        .map(|(&unit_id, _)| unit_id)
        .collect();
    missing.sort_unstable();

    let mut filled = Vec::new();
    for unit_id in missing {
        let mut candidates: Vec<&DistrictLineage> = lineage
            .iter()
            .filter(|row| row.current_unit_id == unit_id)
            .collect();
        candidates.sort_by(|a, b| {
            b.split_year
                .cmp(&a.split_year)
                .then_with(|| a.parent_unit_id.cmp(&b.parent_unit_id))
        });

        let inherited = candidates.into_iter().find_map(|row| {
            let source = results.get(&row.parent_unit_id)?;
            if !source.has_data() || source.inherited {
                return None;
            }
            let name = tree
                .get(row.parent_unit_id)
                .map(|unit| unit.name.clone())
                .unwrap_or_else(|| format!("unit {}", row.parent_unit_id));
            let mut copy = source.clone();
            copy.inherited = true;
            copy.inherited_from = Some(name);
            Some(copy)
        });

        if let Some(copy) = inherited {
            filled.push((unit_id, copy));
        }
    }

    let count = filled.len();
    for (unit_id, copy) in filled {
        results.insert(unit_id, copy);
    }
    count
}
