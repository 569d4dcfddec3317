//! Boundary/statistics join.
//!
//! Geometry and statistics travel separately and meet here. The join is total
//! on the geometry side: every feature that survives cleaning is emitted,
//! flagged `noData` when nothing matched it. Statistics without a feature are
//! only counted.

use std::collections::HashSet;

use crate::aggregate::AggregateSet;
use crate::feature::{CollectionMetadata, Feature, FeatureCollection};
use crate::geometry::{BBox, bbox_of, clean_geometry, merge_bbox, to_geojson};

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub collection: FeatureCollection,
    /// Features dropped because their geometry did not survive cleaning.
    pub skipped: usize,
    pub unmatched_stats: usize,
}

/// Clean every feature's geometry in place, dropping features left with
/// nothing renderable. Returns the survivors, the number dropped and the
/// bounding box of what survived.
pub fn clean_features(features: Vec<Feature>) -> (Vec<Feature>, usize, Option<BBox>) {
    let mut kept = Vec::with_capacity(features.len());
    let mut skipped = 0;
    let mut bbox = None;

    for mut feature in features {
        match clean_geometry(feature.unit_id(), &feature.geometry) {
            Ok(shape) => {
                bbox = merge_bbox(bbox, bbox_of(&shape));
                feature.geometry = to_geojson(&shape);
                kept.push(feature);
            }
            Err(_) => skipped += 1,
        }
    }
    (kept, skipped, bbox)
}

/// Geometry-only collection, as served for boundary requests.
pub fn boundary_collection(features: Vec<Feature>) -> FeatureCollection {
    let (features, skipped, bbox) = clean_features(features);
    FeatureCollection {
        metadata: CollectionMetadata {
            unit_count: features.len(),
            skipped,
        },
        features,
        bbox,
    }
}

/// Attach `stats` to `features`, keeping only features whose parent is
/// `parent_filter` when one is given.
///
/// A feature is flagged `noData` when no statistic matched it or the matched
/// statistic folded no records.
pub fn join(
    features: Vec<Feature>,
    stats: &AggregateSet,
    parent_filter: Option<i64>,
) -> JoinOutcome {
    let filtered: Vec<Feature> = features
        .into_iter()
        .filter(|f| parent_filter.is_none_or(|parent| f.properties.parent_id == Some(parent)))
        .collect();

    let (mut features, skipped, bbox) = clean_features(filtered);

    let mut matched = HashSet::with_capacity(features.len());
    for feature in &mut features {
        let stat = stats.get(&feature.unit_id());
        if stat.is_some() {
            matched.insert(feature.unit_id());
        }
        feature.properties.no_data = stat.is_none_or(|s| !s.has_data());
        feature.properties.stats = stat.cloned();
    }
    let unmatched_stats = stats.keys().filter(|id| !matched.contains(id)).count();

    JoinOutcome {
        collection: FeatureCollection {
            metadata: CollectionMetadata {
                unit_count: features.len(),
                skipped,
            },
            features,
            bbox,
        },
        skipped,
        unmatched_stats,
    }
}
