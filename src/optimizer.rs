//! Collapse the polygonal features of a collection into one multipolygon.
//!
//! The intersection engine only needs the covered area of the uploaded
//! operand, and its cost grows with the feature count, so every Polygon and
//! MultiPolygon is unioned into a single feature. Other features are kept
//! as they are, after the merged one.
//!
//! The union is a left fold in input order seeded with the first polygonal
//! feature, which makes the result deterministic for a given input order.
//! Any failure (malformed ring, union panic) falls back to the unmerged
//! collection.

use std::panic::{self, AssertUnwindSafe};

use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use log::{debug, info, warn};

use crate::error::OptimizeError;
use crate::model::LoadedCollection;

/// Optimize an accepted collection, falling back to it unchanged on failure.
pub fn optimize(loaded: LoadedCollection) -> LoadedCollection {
    match try_optimize(&loaded.collection) {
        Ok(Some(collection)) => {
            info!(
                "{}: {} features reduced to {}",
                loaded.file_name,
                loaded.len(),
                collection.features.len()
            );
            LoadedCollection {
                collection,
                ..loaded
            }
        }
        Ok(None) => {
            debug!("{}: no polygonal features to merge", loaded.file_name);
            loaded
        }
        Err(err) => {
            warn!(
                "{}: polygon merge failed, keeping {} unmerged features: {}",
                loaded.file_name,
                loaded.len(),
                err
            );
            loaded
        }
    }
}

/// Merge the polygonal features. `Ok(None)` when there are none.
pub fn try_optimize(collection: &FeatureCollection) -> Result<Option<FeatureCollection>, OptimizeError> {
    let (polygonal, other): (Vec<_>, Vec<_>) = collection
        .features
        .iter()
        .enumerate()
        .partition(|(_, feature)| is_polygonal(feature));
    if polygonal.is_empty() {
        return Ok(None);
    }

    let mut shapes = polygonal
        .iter()
        .map(|(index, feature)| to_multi_polygon(*index, feature))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let seed = shapes.next().unwrap_or_else(|| MultiPolygon::new(Vec::new()));
    let merged = shapes.try_fold(seed, |acc, next| union(&acc, &next))?;

    let mut features = Vec::with_capacity(other.len() + 1);
    features.push(Feature {
        bbox: None,
        geometry: Some(Geometry::new(to_geojson_value(&merged))),
        id: None,
        properties: Some(JsonObject::new()),
        foreign_members: None,
    });
    features.extend(other.into_iter().map(|(_, feature)| feature.clone()));

    Ok(Some(FeatureCollection {
        bbox: collection.bbox.clone(),
        features,
        foreign_members: collection.foreign_members.clone(),
    }))
}

pub fn is_polygonal(feature: &Feature) -> bool {
    matches!(
        feature.geometry.as_ref().map(|geometry| &geometry.value),
        Some(Value::Polygon(_) | Value::MultiPolygon(_))
    )
}

fn union(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
) -> Result<MultiPolygon<f64>, OptimizeError> {
    panic::catch_unwind(AssertUnwindSafe(|| a.union(b))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        OptimizeError::UnionPanicked { message }
    })
}

fn to_multi_polygon(index: usize, feature: &Feature) -> Result<MultiPolygon<f64>, OptimizeError> {
    let polygons = match feature.geometry.as_ref().map(|geometry| &geometry.value) {
        Some(Value::Polygon(rings)) => vec![to_polygon(index, rings)?],
        Some(Value::MultiPolygon(polygons)) => polygons
            .iter()
            .map(|rings| to_polygon(index, rings))
            .collect::<Result<_, _>>()?,
        _ => Vec::new(),
    };
    Ok(MultiPolygon::new(polygons))
}

fn to_polygon(index: usize, rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, OptimizeError> {
    let Some((exterior, holes)) = rings.split_first() else {
        return Err(OptimizeError::MalformedRing {
            index,
            positions: 0,
        });
    };
    let exterior = to_ring(index, exterior)?;
    let holes = holes
        .iter()
        .map(|ring| to_ring(index, ring))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, holes))
}

/// A ring needs four positions once closed.
fn to_ring(index: usize, positions: &[Vec<f64>]) -> Result<LineString<f64>, OptimizeError> {
    let coords = positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(OptimizeError::InvalidPosition { index }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let closed_len = match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if first != last => coords.len() + 1,
        _ => coords.len(),
    };
    if closed_len < 4 {
        return Err(OptimizeError::MalformedRing {
            index,
            positions: coords.len(),
        });
    }
    Ok(LineString::new(coords))
}

fn to_geojson_value(merged: &MultiPolygon<f64>) -> Value {
    Value::MultiPolygon(
        merged
            .iter()
            .map(|polygon| {
                let mut rings = vec![ring_positions(polygon.exterior())];
                rings.extend(polygon.interiors().iter().map(ring_positions));
                rings
            })
            .collect(),
    )
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.points().map(|point| vec![point.x(), point.y()]).collect()
}
