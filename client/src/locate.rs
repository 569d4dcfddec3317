use atlas_shared::geometry::{BBox, bbox_contains, bbox_of, clean_geometry, contains_point};
use atlas_shared::{Feature, FeatureCollection};
use geo::MultiPolygon;

const GRID_COLS: usize = 32;
const GRID_ROWS: usize = 32;

/// A uniform grid over the loaded features' extent for point hit-testing.
/// Rebuilt whenever the visible collection changes.
pub struct PointLocator {
    cells: Vec<Vec<usize>>,
    shapes: Vec<MultiPolygon<f64>>,
    bboxes: Vec<BBox>,
    feature_ids: Vec<i64>,
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
}

impl PointLocator {
    pub fn build(collection: &FeatureCollection) -> Self {
        let mut shapes = Vec::with_capacity(collection.len());
        let mut bboxes = Vec::with_capacity(collection.len());
        let mut feature_ids = Vec::with_capacity(collection.len());

        for feature in &collection.features {
            let Ok(shape) = clean_geometry(feature.unit_id(), &feature.geometry) else {
                continue;
            };
            let Some(bbox) = bbox_of(&shape) else {
                continue;
            };
            shapes.push(shape);
            bboxes.push(bbox);
            feature_ids.push(feature.unit_id());
        }

        if shapes.is_empty() {
            return Self {
                cells: Vec::new(),
                shapes,
                bboxes,
                feature_ids,
                min_x: 0.0,
                min_y: 0.0,
                cell_w: 1.0,
                cell_h: 1.0,
            };
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for [x0, y0, x1, y1] in &bboxes {
            min_x = min_x.min(*x0);
            min_y = min_y.min(*y0);
            max_x = max_x.max(*x1);
            max_y = max_y.max(*y1);
        }

        // Pad so points on the outer boundary still map to a cell
        let pad = ((max_x - min_x).max(max_y - min_y) * 1e-6).max(1e-9);
        min_x -= pad;
        min_y -= pad;
        max_x += pad;
        max_y += pad;

        let cell_w = (max_x - min_x) / GRID_COLS as f64;
        let cell_h = (max_y - min_y) / GRID_ROWS as f64;

        let mut cells = vec![Vec::new(); GRID_COLS * GRID_ROWS];
        for (idx, [x0, y0, x1, y1]) in bboxes.iter().enumerate() {
            let col_start = ((x0 - min_x) / cell_w).floor().max(0.0) as usize;
            let col_end = ((x1 - min_x) / cell_w).ceil().min(GRID_COLS as f64) as usize;
            let row_start = ((y0 - min_y) / cell_h).floor().max(0.0) as usize;
            let row_end = ((y1 - min_y) / cell_h).ceil().min(GRID_ROWS as f64) as usize;

            for row in row_start..row_end {
                for col in col_start..col_end {
                    cells[row * GRID_COLS + col].push(idx);
                }
            }
        }

        Self {
            cells,
            shapes,
            bboxes,
            feature_ids,
            min_x,
            min_y,
            cell_w,
            cell_h,
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Unit id of the feature containing `(lng, lat)`, if any.
    pub fn locate(&self, lng: f64, lat: f64) -> Option<i64> {
        if self.cells.is_empty() || !lng.is_finite() || !lat.is_finite() {
            return None;
        }

        let col = ((lng - self.min_x) / self.cell_w).floor() as isize;
        let row = ((lat - self.min_y) / self.cell_h).floor() as isize;
        if col < 0 || row < 0 || col >= GRID_COLS as isize || row >= GRID_ROWS as isize {
            return None;
        }

        self.cells[row as usize * GRID_COLS + col as usize]
            .iter()
            .copied()
            .find(|&idx| {
                bbox_contains(&self.bboxes[idx], lng, lat)
                    && contains_point(&self.shapes[idx], lng, lat)
            })
            .map(|idx| self.feature_ids[idx])
    }

    pub fn locate_feature<'a>(
        &self,
        collection: &'a FeatureCollection,
        lng: f64,
        lat: f64,
    ) -> Option<&'a Feature> {
        self.locate(lng, lat).and_then(|id| collection.find(id))
    }
}
