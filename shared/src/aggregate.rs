//! Upward aggregation of leaf records over the administrative tree.
//!
//! Records are grouped in a single pass: each record's target unit is read
//! from the tree's ancestor closure table rather than found by walking the
//! parent chain per record or enumerating subtrees per target unit.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::level::AdminLevel;
use crate::metric::{EntryKey, MetricRecord};
use crate::unit::{AdminTree, AdminUnit};

/// A candidate (elections) or incident category (issues) with its summed count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub count: u64,
    /// Percentage of the unit's total count.
    pub share: f64,
}

/// Statistics for one administrative unit at the requested level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub total_count: u64,
    #[serde(default)]
    pub entries: Vec<RankedEntry>,
    pub winner: Option<RankedEntry>,
    #[serde(default)]
    pub margin: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub measures: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_voters: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnout: Option<f64>,
    /// Number of raw records folded into this result.
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub inherited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

impl AggregateResult {
    pub fn has_data(&self) -> bool {
        self.record_count > 0
    }
}

/// Aggregates keyed by unit id, one per unit at the target level.
pub type AggregateSet = BTreeMap<i64, AggregateResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateRequest {
    pub target_level: AdminLevel,
    pub parent_id: Option<i64>,
    pub storage_level: AdminLevel,
    /// Attach registered voters and turnout (elections only).
    pub with_turnout: bool,
}

#[derive(Debug, Default)]
struct Accumulator {
    total: u64,
    records: u64,
    entries: HashMap<i64, (EntryKey, u64)>,
    measures: BTreeMap<&'static str, u64>,
}

impl Accumulator {
    fn add(&mut self, record: &MetricRecord) {
        self.total += record.count;
        self.records += 1;
        if let Some(entry) = &record.entry {
            self.entries
                .entry(entry.id)
                .or_insert_with(|| (entry.clone(), 0))
                .1 += record.count;
        }
        for &(name, value) in &record.measures {
            *self.measures.entry(name).or_insert(0) += value;
        }
    }

    fn finish(self) -> AggregateResult {
        let total = self.total;
        let mut entries: Vec<RankedEntry> = self
            .entries
            .into_values()
            .map(|(key, count)| RankedEntry {
                id: key.id,
                name: key.name,
                group: key.group,
                count,
                share: share_of(count, total),
            })
            .collect();
        entries.sort_by(rank_order);

        let winner = entries.first().filter(|_| total > 0).cloned();
        let margin = match entries.as_slice() {
            [first, second, ..] if total > 0 => first.share - second.share,
            _ => 0.0,
        };

        AggregateResult {
            total_count: total,
            entries,
            winner,
            margin,
            measures: self
                .measures
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            record_count: self.records,
            ..AggregateResult::default()
        }
    }
}

/// Count descending, then lowest id first among equal counts.
fn rank_order(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id))
}

fn share_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 * 100.0 / total as f64
}

/// Aggregate `records` (stored at `request.storage_level`) to every unit at
/// `request.target_level`, optionally restricted to descendants of
/// `request.parent_id`.
///
/// Every output unit appears in the result; units without records carry an
/// empty result. Records attached to units at any other level than the
/// storage level are ignored. When the target is finer than the storage level
/// records cannot be apportioned downward, so they are grouped at their
/// storage-level unit instead and the output is keyed by those units.
pub fn aggregate(
    tree: &AdminTree,
    records: &[MetricRecord],
    request: &AggregateRequest,
) -> Result<AggregateSet> {
    let group_level = request.target_level.min(request.storage_level);
    let targets = if group_level == request.target_level {
        tree.units_within(request.target_level, request.parent_id)?
    } else {
        storage_units(tree, request.storage_level, request.parent_id)?
    };
    let mut accumulators: HashMap<i64, Accumulator> = targets
        .iter()
        .map(|unit| (unit.id, Accumulator::default()))
        .collect();

    for record in records {
        let Some(row) = tree.ancestors(record.unit_id) else {
            continue;
        };
        if row[request.storage_level.index()] != Some(record.unit_id) {
            continue;
        }
        let Some(target_id) = row[group_level.index()] else {
            continue;
        };
        if let Some(acc) = accumulators.get_mut(&target_id) {
            acc.add(record);
        }
    }

    Ok(accumulators
        .into_iter()
        .map(|(unit_id, acc)| {
            let mut result = acc.finish();
            if request.with_turnout {
                result.registered_voters = tree.registered_voters(unit_id);
                result.turnout = result
                    .registered_voters
                    .filter(|&voters| voters > 0)
                    .map(|voters| share_of(result.total_count, voters));
            }
            (unit_id, result)
        })
        .collect())
}

/// Storage-level units under `parent_id`, or the one holding it when the
/// parent sits at or below the storage level.
fn storage_units(
    tree: &AdminTree,
    storage_level: AdminLevel,
    parent_id: Option<i64>,
) -> Result<Vec<&AdminUnit>> {
    let Some(parent_id) = parent_id else {
        return tree.units_within(storage_level, None);
    };
    let parent = tree.require(parent_id)?;
    if parent.level < storage_level {
        return tree.units_within(storage_level, Some(parent_id));
    }
    Ok(tree
        .ancestor_at(parent_id, storage_level)
        .and_then(|id| tree.get(id))
        .into_iter()
        .collect())
}

/// Sum of `total_count` over a set.
pub fn grand_total(set: &AggregateSet) -> u64 {
    set.values().map(|r| r.total_count).sum()
}
