//! Convert zipped Shapefile bundles into feature collections.
//!
//! An archive may hold several layers. Entries are grouped by their path
//! without extension (case-insensitive) and every group owning a `.shp`
//! becomes one [`LoadedCollection`]. The `.dbf` supplies properties and the
//! `.prj` supplies the declared projection. The `.shx` index is not needed
//! since records are read sequentially.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};
use log::{debug, warn};
use shapefile::dbase::{self, FieldValue};
use shapefile::{PolygonRing, Shape, ShapeReader};

use crate::error::ParseError;
use crate::model::{LoadedCollection, RawFile};

/// Layers read from one archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub layers: Vec<LoadedCollection>,
    /// Names of layers shipped without a `.prj` component.
    pub missing_prj: Vec<String>,
}

#[derive(Debug, Default)]
struct LayerParts {
    name: String,
    shp: Option<Vec<u8>>,
    dbf: Option<Vec<u8>>,
    prj: Option<Vec<u8>>,
}

pub fn convert(file: &RawFile) -> Result<Conversion, ParseError> {
    let groups = read_archive(file)?;
    let mut layers = Vec::new();
    let mut missing_prj = Vec::new();

    for parts in groups.into_values() {
        let Some(shp) = parts.shp else {
            debug!("Ignoring {} in {}: no .shp component", parts.name, file.name);
            continue;
        };
        let projection = match parts.prj.as_deref() {
            Some(prj) => prj_projection(&String::from_utf8_lossy(prj)),
            None => {
                warn!("Layer {} in {} has no .prj", parts.name, file.name);
                missing_prj.push(parts.name.clone());
                None
            }
        };
        let features = read_features(file, &parts.name, shp, parts.dbf)?;
        debug!(
            "Layer {} in {}: {} features, projection {:?}",
            parts.name,
            file.name,
            features.len(),
            projection
        );

        let mut members = JsonObject::new();
        members.insert("name".to_owned(), JsonValue::String(parts.name.clone()));
        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(members),
        };
        layers.push(LoadedCollection::new(file.name.clone(), collection).with_projection(projection));
    }

    if layers.is_empty() {
        return Err(ParseError::NoLayers {
            file: file.name.clone(),
        });
    }
    Ok(Conversion {
        layers,
        missing_prj,
    })
}

fn read_archive(file: &RawFile) -> Result<BTreeMap<String, LayerParts>, ParseError> {
    let corrupt = |source| ParseError::Corrupt {
        file: file.name.clone(),
        source,
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(file.bytes.as_slice())).map_err(corrupt)?;
    let mut groups: BTreeMap<String, LayerParts> = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(corrupt)?;
        let path = entry.name().to_owned();
        if entry.is_dir() || is_resource_fork(&path) {
            continue;
        }
        let Some((stem, ext)) = path.rsplit_once('.') else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if !matches!(ext.as_str(), "shp" | "dbf" | "prj") {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| ParseError::Archive {
                file: file.name.clone(),
                entry: path.clone(),
                source,
            })?;

        let parts = groups.entry(stem.to_ascii_lowercase()).or_default();
        if parts.name.is_empty() {
            parts.name = stem.rsplit('/').next().unwrap_or(stem).to_owned();
        }
        match ext.as_str() {
            "shp" => parts.shp = Some(bytes),
            "dbf" => parts.dbf = Some(bytes),
            _ => parts.prj = Some(bytes),
        }
    }
    Ok(groups)
}

fn is_resource_fork(path: &str) -> bool {
    path.starts_with("__MACOSX/")
        || path.contains("/__MACOSX/")
        || path.rsplit('/').next().is_some_and(|name| name.starts_with("._"))
}

fn read_features(
    file: &RawFile,
    layer: &str,
    shp: Vec<u8>,
    dbf: Option<Vec<u8>>,
) -> Result<Vec<Feature>, ParseError> {
    let shape_error = |source| ParseError::ShapeData {
        file: file.name.clone(),
        layer: layer.to_owned(),
        source,
    };
    let mut shape_reader = ShapeReader::new(Cursor::new(shp)).map_err(shape_error)?;

    let Some(dbf) = dbf else {
        return shape_reader
            .iter_shapes()
            .map(|shape| shape.map(|shape| to_feature(layer, shape, JsonObject::new())))
            .collect::<Result<Vec<_>, _>>()
            .map_err(shape_error);
    };

    let dbase_reader =
        dbase::Reader::new(Cursor::new(dbf)).map_err(|source| ParseError::Attributes {
            file: file.name.clone(),
            layer: layer.to_owned(),
            source,
        })?;
    let mut reader = shapefile::Reader::new(shape_reader, dbase_reader);
    reader
        .iter_shapes_and_records()
        .map(|pair| pair.map(|(shape, record)| to_feature(layer, shape, properties(record))))
        .collect::<Result<Vec<_>, _>>()
        .map_err(shape_error)
}

fn to_feature(layer: &str, shape: Shape, properties: JsonObject) -> Feature {
    let value = shape_value(shape).unwrap_or_else(|kind| {
        warn!("Layer {layer}: dropping unsupported {kind} geometry");
        None
    });
    Feature {
        bbox: None,
        geometry: value.map(Geometry::new),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// GeoJSON value of a shape. `Err` names shapes GeoJSON cannot express;
/// null shapes yield `Ok(None)`.
fn shape_value(shape: Shape) -> Result<Option<Value>, &'static str> {
    let value = match shape {
        Shape::NullShape => None,
        Shape::Point(point) => Some(Value::Point(point.position())),
        Shape::PointM(point) => Some(Value::Point(point.position())),
        Shape::PointZ(point) => Some(Value::Point(point.position())),
        Shape::Multipoint(multipoint) => points_value(multipoint.points()),
        Shape::MultipointM(multipoint) => points_value(multipoint.points()),
        Shape::MultipointZ(multipoint) => points_value(multipoint.points()),
        Shape::Polyline(polyline) => parts_value(polyline.parts()),
        Shape::PolylineM(polyline) => parts_value(polyline.parts()),
        Shape::PolylineZ(polyline) => parts_value(polyline.parts()),
        Shape::Polygon(polygon) => rings_value(polygon.rings()),
        Shape::PolygonM(polygon) => rings_value(polygon.rings()),
        Shape::PolygonZ(polygon) => rings_value(polygon.rings()),
        Shape::Multipatch(_) => return Err("multipatch"),
    };
    Ok(value)
}

trait PlanarPoint {
    fn position(&self) -> Vec<f64>;
}

impl PlanarPoint for shapefile::Point {
    fn position(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}

impl PlanarPoint for shapefile::PointM {
    fn position(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}

impl PlanarPoint for shapefile::PointZ {
    fn position(&self) -> Vec<f64> {
        vec![self.x, self.y]
    }
}

fn line<P: PlanarPoint>(points: &[P]) -> Vec<Vec<f64>> {
    points.iter().map(PlanarPoint::position).collect()
}

fn points_value<P: PlanarPoint>(points: &[P]) -> Option<Value> {
    (!points.is_empty()).then(|| Value::MultiPoint(line(points)))
}

fn parts_value<P: PlanarPoint>(parts: &[Vec<P>]) -> Option<Value> {
    match parts {
        [] => None,
        [single] => Some(Value::LineString(line(single))),
        _ => Some(Value::MultiLineString(
            parts.iter().map(|part| line(part)).collect(),
        )),
    }
}

/// Outer rings open a new polygon, inner rings attach to the latest one.
/// An inner ring seen before any outer ring is promoted to an exterior.
fn rings_value<P: PlanarPoint>(rings: &[PolygonRing<P>]) -> Option<Value> {
    let mut polygons: Vec<Vec<Vec<Vec<f64>>>> = Vec::new();
    for ring in rings {
        let coords = line(ring.points());
        match polygons.last_mut() {
            Some(polygon) if matches!(ring, PolygonRing::Inner(_)) => polygon.push(coords),
            _ => polygons.push(vec![coords]),
        }
    }
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Value::Polygon),
        _ => Some(Value::MultiPolygon(polygons)),
    }
}

fn properties(record: dbase::Record) -> JsonObject {
    HashMap::<String, FieldValue>::from(record)
        .into_iter()
        .map(|(name, value)| (name, field_value(value)))
        .collect()
}

fn field_value(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(text)) => JsonValue::String(text),
        FieldValue::Memo(text) => JsonValue::String(text),
        FieldValue::Numeric(Some(number)) | FieldValue::Double(number) => number_value(number),
        FieldValue::Currency(number) => number_value(number),
        FieldValue::Float(Some(number)) => number_value(f64::from(number)),
        FieldValue::Integer(number) => JsonValue::from(number),
        FieldValue::Logical(Some(flag)) => JsonValue::Bool(flag),
        FieldValue::Date(Some(date)) => JsonValue::String(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => JsonValue::Null,
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn number_value(number: f64) -> JsonValue {
    serde_json::Number::from_f64(number).map_or(JsonValue::Null, JsonValue::Number)
}

/// Projection identifier declared by a `.prj` WKT string.
///
/// An `AUTHORITY["EPSG", ...]` (or WKT2 `ID[...]`) directly under the root
/// node wins; authorities of nested datums, spheroids or units are ignored.
/// Without one,
/// well-known ESRI/OGC names are mapped to their EPSG code. Anything else is
/// returned as its raw CRS name, which no allowlist will contain.
pub fn prj_projection(wkt: &str) -> Option<String> {
    let wkt = wkt.trim().trim_start_matches('\u{feff}');
    if wkt.is_empty() {
        return None;
    }
    if let Some(code) = root_epsg_authority(wkt) {
        return Some(code);
    }
    let name = root_name(wkt).unwrap_or(wkt);
    let normalized = normalize_name(name);
    let known = WELL_KNOWN_NAMES
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, code)| (*code).to_owned());
    Some(known.unwrap_or_else(|| name.to_owned()))
}

const WELL_KNOWN_NAMES: &[(&str, &str)] = &[
    ("GCS_WGS_1984", "EPSG:4326"),
    ("WGS_84", "EPSG:4326"),
    ("WGS_1984", "EPSG:4326"),
    ("WGS_1984_WEB_MERCATOR_AUXILIARY_SPHERE", "EPSG:3857"),
    ("WGS_1984_WEB_MERCATOR", "EPSG:3857"),
    ("WGS_84_PSEUDO_MERCATOR", "EPSG:3857"),
    ("POPULAR_VISUALISATION_CRS_MERCATOR", "EPSG:3857"),
    ("GCS_RGF_1993", "EPSG:4171"),
    ("RGF93", "EPSG:4171"),
    ("RGF93_LAMBERT_93", "EPSG:2154"),
    ("RGF_1993_LAMBERT_93", "EPSG:2154"),
    ("NTF_PARIS_LAMBERT_ZONE_II", "EPSG:27572"),
    ("NTF_PARIS_LAMBERT_II_ETENDU", "EPSG:27572"),
    ("ETRS_1989_LAEA", "EPSG:3035"),
    ("ETRS89_LAEA_EUROPE", "EPSG:3035"),
];

fn root_epsg_authority(wkt: &str) -> Option<String> {
    root_children(wkt)?.into_iter().rev().find_map(|child| {
        let (keyword, body) = child.split_once('[')?;
        if !matches!(keyword.trim(), "AUTHORITY" | "ID") {
            return None;
        }
        let mut fields = body
            .trim_end_matches(']')
            .split(',')
            .map(|field| field.trim().trim_matches('"'));
        let authority = fields.next()?;
        let code = fields.next()?;
        (authority.eq_ignore_ascii_case("EPSG")
            && !code.is_empty()
            && code.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("EPSG:{code}"))
    })
}

/// Direct children of the root WKT node, split on top-level commas.
/// Quoted text is skipped; both bracket styles nest.
fn root_children(wkt: &str) -> Option<Vec<&str>> {
    let open = wkt.find(['[', '('])? + 1;
    let mut children = Vec::new();
    let mut depth = 0_usize;
    let mut quoted = false;
    let mut start = open;
    for (offset, c) in wkt[open..].char_indices() {
        let at = open + offset;
        match c {
            '"' => quoted = !quoted,
            _ if quoted => {}
            '[' | '(' => depth += 1,
            ']' | ')' if depth == 0 => {
                children.push(wkt[start..at].trim());
                return Some(children);
            }
            ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                children.push(wkt[start..at].trim());
                start = at + 1;
            }
            _ => {}
        }
    }
    children.push(wkt[start..].trim());
    Some(children)
}

fn root_name(wkt: &str) -> Option<&str> {
    let start = wkt.find("[\"")? + 2;
    let len = wkt[start..].find('"')?;
    Some(&wkt[start..start + len])
}

fn normalize_name(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    upper
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
