//! Read uploaded JSON documents into feature collections.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use log::debug;

use crate::error::ParseError;
use crate::model::{LoadedCollection, RawFile};

const CRS_MEMBER: &str = "crs";

/// Parse a JSON upload.
///
/// Syntax errors and valid-JSON-but-not-GeoJSON are reported separately, so
/// the caller can tell an unreadable document from a structural problem.
/// A lone `Feature` or `Geometry` is wrapped into a one-feature collection.
/// The `crs` member is always stripped.
pub fn read_document(file: &RawFile) -> Result<LoadedCollection, ParseError> {
    let value: JsonValue =
        serde_json::from_slice(&file.bytes).map_err(|source| ParseError::InvalidJson {
            file: file.name.clone(),
            source,
        })?;
    let projection = declared_projection(&value);

    let geojson = GeoJson::from_json_value(value).map_err(|source| ParseError::NotGeoJson {
        file: file.name.clone(),
        source,
    })?;
    let mut collection = into_collection(geojson);
    if strip_crs(&mut collection) {
        debug!("Stripped crs member from {}", file.name);
    }

    Ok(LoadedCollection::new(file.name.clone(), collection).with_projection(projection))
}

/// The projection recorded by map exports under `map.projection`.
pub fn declared_projection(value: &JsonValue) -> Option<String> {
    value
        .pointer("/map/projection")
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_owned)
}

fn into_collection(geojson: GeoJson) -> FeatureCollection {
    match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(geometry) => FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: Some(JsonObject::new()),
                foreign_members: None,
            }],
            foreign_members: None,
        },
    }
}

/// Remove every `crs` member from the collection, its features and their
/// geometries.
///
/// The downstream engine only reads the default geographic CRS and silently
/// mis-evaluates anything else (QGIS writes `urn:ogc:def:crs:OGC:1.3:CRS84`).
pub fn strip_crs(collection: &mut FeatureCollection) -> bool {
    let mut stripped = remove_crs(&mut collection.foreign_members);
    for feature in &mut collection.features {
        stripped |= remove_crs(&mut feature.foreign_members);
        if let Some(geometry) = feature.geometry.as_mut() {
            stripped |= strip_geometry_crs(geometry);
        }
    }
    stripped
}

fn strip_geometry_crs(geometry: &mut Geometry) -> bool {
    let mut stripped = remove_crs(&mut geometry.foreign_members);
    if let Value::GeometryCollection(members) = &mut geometry.value {
        for member in members {
            stripped |= strip_geometry_crs(member);
        }
    }
    stripped
}

fn remove_crs(members: &mut Option<JsonObject>) -> bool {
    let Some(object) = members.as_mut() else {
        return false;
    };
    let removed = object.remove(CRS_MEMBER).is_some();
    if object.is_empty() {
        *members = None;
    }
    removed
}
