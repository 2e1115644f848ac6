//! Bounding boxes of uploaded collections and the extents they must fit in.

use geojson::{FeatureCollection, Value};

/// Axis-aligned extent as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

pub const WGS84_EXTENT: Extent = Extent::new(-180.0, -90.0, 180.0, 90.0);

pub const MERCATOR_EXTENT: Extent = Extent::new(
    -20_037_508.342_789_244,
    -20_037_508.342_789_244,
    20_037_508.342_789_244,
    20_037_508.342_789_244,
);

impl Extent {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build from a `[min_x, min_y, max_x, max_y]` array as found in
    /// projection definitions.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [min_x, min_y, max_x, max_y] if min_x <= max_x && min_y <= max_y => {
                Some(Self::new(*min_x, *min_y, *max_x, *max_y))
            }
            _ => None,
        }
    }

    pub fn contains(&self, other: &Extent) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Bounds of every position in the collection, `None` if it has none.
pub fn collection_bounds(collection: &FeatureCollection) -> Option<Extent> {
    let mut bounds: Option<Extent> = None;
    for geometry in collection
        .features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref())
    {
        visit_positions(&geometry.value, &mut |x, y| match bounds.as_mut() {
            Some(extent) => extent.include(x, y),
            None => bounds = Some(Extent::new(x, y, x, y)),
        });
    }
    bounds
}

/// Whether every coordinate of the collection lies inside `extent`.
pub fn fits(collection: &FeatureCollection, extent: &Extent) -> bool {
    collection_bounds(collection).map_or(true, |bounds| extent.contains(&bounds))
}

fn visit_positions(value: &Value, visit: &mut impl FnMut(f64, f64)) {
    match value {
        Value::Point(coords) => visit_position(coords, visit),
        Value::MultiPoint(points) | Value::LineString(points) => points
            .iter()
            .for_each(|coords| visit_position(coords, visit)),
        Value::MultiLineString(lines) | Value::Polygon(lines) => lines
            .iter()
            .flatten()
            .for_each(|coords| visit_position(coords, visit)),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .flatten()
            .for_each(|coords| visit_position(coords, visit)),
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                visit_positions(&geometry.value, visit);
            }
        }
    }
}

fn visit_position(coords: &[f64], visit: &mut impl FnMut(f64, f64)) {
    if let [x, y, ..] = coords {
        visit(*x, *y);
    }
}
