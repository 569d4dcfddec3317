//! In-memory point lookup for the seed store.
//!
//! An R-tree over unit bounding boxes narrows the candidates; exact
//! containment is the shared ray-casting test, so holes are honored.

use std::collections::HashMap;

use atlas_shared::AdminLevel;
use atlas_shared::geometry::{bbox_of, clean_geometry, contains_point};
use geo::MultiPolygon;
use rstar::{AABB, RTree, RTreeObject};
use serde_json::Value;

struct IndexedUnit {
    unit_id: i64,
    level: AdminLevel,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedUnit {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct SpatialIndex {
    tree: RTree<IndexedUnit>,
    shapes: HashMap<i64, MultiPolygon<f64>>,
}

impl SpatialIndex {
    /// Index every geometry that survives cleaning. Returns the index and the
    /// number of geometries that were dropped.
    pub fn build<'a, I>(geometries: I) -> (Self, usize)
    where
        I: IntoIterator<Item = (i64, AdminLevel, &'a Value)>,
    {
        let mut items = Vec::new();
        let mut shapes = HashMap::new();
        let mut skipped = 0;

        for (unit_id, level, raw) in geometries {
            let shape = match clean_geometry(unit_id, raw) {
                Ok(shape) => shape,
                Err(e) => {
                    tracing::debug!(error = %e, "geometry excluded from spatial index");
                    skipped += 1;
                    continue;
                }
            };
            let Some([min_x, min_y, max_x, max_y]) = bbox_of(&shape) else {
                skipped += 1;
                continue;
            };
            items.push(IndexedUnit {
                unit_id,
                level,
                aabb: AABB::from_corners([min_x, min_y], [max_x, max_y]),
            });
            shapes.insert(unit_id, shape);
        }

        let index = Self {
            tree: RTree::bulk_load(items),
            shapes,
        };
        (index, skipped)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Ids of the units containing the point, optionally at one level only.
    pub fn locate(&self, lng: f64, lat: f64, level: Option<AdminLevel>) -> Vec<i64> {
        let envelope = AABB::from_point([lng, lat]);
        let mut hits: Vec<i64> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|item| level.is_none_or(|level| item.level == level))
            .filter(|item| {
                self.shapes
                    .get(&item.unit_id)
                    .is_some_and(|shape| contains_point(shape, lng, lat))
            })
            .map(|item| item.unit_id)
            .collect();
        hits.sort_unstable();
        hits
    }
}
