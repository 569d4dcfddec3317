//! GeoJSON polygon parsing, defensive cleaning and point containment.

use geo::{Area, BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use serde_json::{Value, json};

use crate::error::{AtlasError, Result};

/// Rings enclosing less than this (in squared degrees) are treated as degenerate.
const MIN_RING_AREA: f64 = 1e-12;

/// `[min_lng, min_lat, max_lng, max_lat]`
pub type BBox = [f64; 4];

/// Parse a GeoJSON `Polygon` or `MultiPolygon` and drop everything that
/// cannot be rendered: non-finite positions, rings with fewer than four
/// positions once closed, zero-area rings, and polygons whose exterior ring
/// did not survive. Fails when nothing is left.
pub fn clean_geometry(unit_id: i64, raw: &Value) -> Result<MultiPolygon<f64>> {
    let parse_error = |reason: &str| AtlasError::GeometryParse {
        unit_id,
        reason: reason.to_string(),
    };

    let coordinates = raw
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error("missing coordinates"))?;

    let polygons: Vec<Polygon<f64>> = match raw.get("type").and_then(Value::as_str) {
        Some("Polygon") => clean_polygon(coordinates).into_iter().collect(),
        Some("MultiPolygon") => coordinates
            .iter()
            .filter_map(Value::as_array)
            .filter_map(|rings| clean_polygon(rings))
            .collect(),
        Some(other) => return Err(parse_error(&format!("unsupported geometry type {other}"))),
        None => return Err(parse_error("missing geometry type")),
    };

    if polygons.is_empty() {
        return Err(parse_error("no valid polygon rings"));
    }
    Ok(MultiPolygon(polygons))
}

fn clean_polygon(rings: &[Value]) -> Option<Polygon<f64>> {
    let mut rings = rings.iter().filter_map(Value::as_array);
    let exterior = clean_ring(rings.next()?)?;
    let interiors = rings.filter_map(|ring| clean_ring(ring)).collect();
    Some(Polygon::new(exterior, interiors))
}

fn clean_ring(positions: &[Value]) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = positions
        .iter()
        .filter_map(Value::as_array)
        .filter_map(|pair| {
            let x = pair.first()?.as_f64()?;
            let y = pair.get(1)?.as_f64()?;
            (x.is_finite() && y.is_finite()).then_some(Coord { x, y })
        })
        .collect();
    coords.dedup();

    if let (Some(&first), Some(&last)) = (coords.first(), coords.last())
        && first != last
    {
        coords.push(first);
    }
    if coords.len() < 4 {
        return None;
    }

    let ring = LineString(coords);
    let area = Polygon::new(ring.clone(), Vec::new()).unsigned_area();
    (area > MIN_RING_AREA).then_some(ring)
}

/// Serialize a cleaned shape back to GeoJSON, as `Polygon` when it has a
/// single part.
pub fn to_geojson(shape: &MultiPolygon<f64>) -> Value {
    let polygon_coords = |polygon: &Polygon<f64>| -> Vec<Vec<[f64; 2]>> {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
            .collect()
    };

    match shape.0.as_slice() {
        [single] => json!({
            "type": "Polygon",
            "coordinates": polygon_coords(single),
        }),
        parts => json!({
            "type": "MultiPolygon",
            "coordinates": parts.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
    }
}

pub fn bbox_of(shape: &MultiPolygon<f64>) -> Option<BBox> {
    shape
        .bounding_rect()
        .map(|rect| [rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

pub fn merge_bbox(a: Option<BBox>, b: Option<BBox>) -> Option<BBox> {
    match (a, b) {
        (Some(a), Some(b)) => Some([
            a[0].min(b[0]),
            a[1].min(b[1]),
            a[2].max(b[2]),
            a[3].max(b[3]),
        ]),
        (a, None) => a,
        (None, b) => b,
    }
}

pub fn bbox_contains(bbox: &BBox, lng: f64, lat: f64) -> bool {
    lng >= bbox[0] && lng <= bbox[2] && lat >= bbox[1] && lat <= bbox[3]
}

/// Even-odd ray casting against one ring, with a horizontal ray towards +x.
///
/// Edges are half-open in y, so a point on an edge shared by two adjacent
/// rings is inside exactly one of them.
pub fn ring_contains(ring: &LineString<f64>, lng: f64, lat: f64) -> bool {
    let pts = &ring.0;
    if pts.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = pts.len() - 1;
    for i in 0..pts.len() {
        let (xi, yi) = (pts[i].x, pts[i].y);
        let (xj, yj) = (pts[j].x, pts[j].y);
        if (yi > lat) != (yj > lat) && lng < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Inside the exterior ring and outside every hole.
pub fn polygon_contains(polygon: &Polygon<f64>, lng: f64, lat: f64) -> bool {
    ring_contains(polygon.exterior(), lng, lat)
        && !polygon
            .interiors()
            .iter()
            .any(|hole| ring_contains(hole, lng, lat))
}

pub fn contains_point(shape: &MultiPolygon<f64>, lng: f64, lat: f64) -> bool {
    shape.0.iter().any(|polygon| polygon_contains(polygon, lng, lat))
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::{Value, json};

    use super::{bbox_of, clean_geometry, contains_point, to_geojson};
    use crate::error::AtlasError;

    pub(crate) fn square(x0: f64, y0: f64, size: f64) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [x0, y0], [x0 + size, y0], [x0 + size, y0 + size], [x0, y0 + size], [x0, y0]
            ]]
        })
    }

    #[test]
    fn closes_open_rings_and_keeps_valid_polygons() {
        let raw = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]]
        });
        let shape = clean_geometry(1, &raw).expect("open ring is repaired");
        assert_eq!(shape.0.len(), 1);
        assert_eq!(shape.0[0].exterior().0.len(), 5);
        assert_eq!(bbox_of(&shape), Some([0.0, 0.0, 4.0, 4.0]));
    }

    #[test]
    fn drops_empty_and_degenerate_parts() {
        let raw = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[]],
                [[[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [0.0, 0.0]]],
                [[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]],
                [[[5.0, 5.0], ["x", 1.0], [6.0, 6.0]]]
            ]
        });
        let shape = clean_geometry(7, &raw).expect("one valid part survives");
        assert_eq!(shape.0.len(), 1);
    }

    #[test]
    fn rejects_geometry_with_nothing_renderable() {
        let empty = json!({"type": "Polygon", "coordinates": [[]]});
        assert!(matches!(
            clean_geometry(3, &empty),
            Err(AtlasError::GeometryParse { unit_id: 3, .. })
        ));
        let point = json!({"type": "Point", "coordinates": [1.0, 2.0]});
        assert!(clean_geometry(3, &point).is_err());
        assert!(clean_geometry(3, &json!({"type": "Polygon"})).is_err());
    }

    #[test]
    fn square_contains_interior_and_excludes_outside() {
        let shape = clean_geometry(1, &square(0.0, 0.0, 10.0)).expect("square");
        assert!(contains_point(&shape, 5.0, 5.0));
        assert!(!contains_point(&shape, 15.0, 5.0));
        assert!(!contains_point(&shape, -0.1, 5.0));
        // Half-open rule: the top-right corner is outside.
        assert!(!contains_point(&shape, 10.0, 10.0));
    }

    #[test]
    fn shared_edge_belongs_to_exactly_one_square() {
        let left = clean_geometry(1, &square(0.0, 0.0, 10.0)).expect("left");
        let right = clean_geometry(2, &square(10.0, 0.0, 10.0)).expect("right");
        let hits = [&left, &right]
            .iter()
            .filter(|shape| contains_point(shape, 10.0, 5.0))
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn holes_are_excluded() {
        let raw = json!({
            "type": "Polygon",
            "coordinates": [
                [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]],
                [[4.0, 4.0], [6.0, 4.0], [6.0, 6.0], [4.0, 6.0], [4.0, 4.0]]
            ]
        });
        let shape = clean_geometry(1, &raw).expect("donut");
        assert!(!contains_point(&shape, 5.0, 5.0));
        assert!(contains_point(&shape, 2.0, 2.0));
    }

    #[test]
    fn geojson_output_round_trips_through_cleaning() {
        let shape = clean_geometry(1, &square(1.0, 1.0, 2.0)).expect("square");
        let value = to_geojson(&shape);
        assert_eq!(value["type"], "Polygon");
        let again = clean_geometry(1, &value).expect("re-clean");
        assert_eq!(again, shape);
    }
}
