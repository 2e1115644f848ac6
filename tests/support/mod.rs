//! In-memory fixtures: GeoJSON documents and zipped Shapefile bundles.
//!
//! The `.shp`, `.shx` and `.dbf` parts are encoded by hand so the tests do
//! not depend on a writer implementation.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use gis_ingest::RawFile;
use serde_json::{json, Value};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// OGC flavour: authorities only on nested nodes, none on the root.
pub const OGC_WGS84_PRJ: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]]]"#;

pub const LAMBERT_93_PRJ: &str = r#"PROJCS["RGF93 / Lambert-93",GEOGCS["RGF93",DATUM["Reseau_Geodesique_Francais_1993",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6171"]],AUTHORITY["EPSG","4171"]],PROJECTION["Lambert_Conformal_Conic_2SP"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","2154"]]"#;

const SHAPE_POLYGON: i32 = 5;
const HEADER_LEN: usize = 100;

/// Closed clockwise square, the orientation shapefiles use for outer rings.
pub fn square_ring(x: f64, y: f64, size: f64) -> Vec<(f64, f64)> {
    vec![
        (x, y),
        (x, y + size),
        (x + size, y + size),
        (x + size, y),
        (x, y),
    ]
}

/// GeoJSON polygon feature for an axis-aligned square.
pub fn square_feature(x: f64, y: f64, size: f64, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]
            ]]
        }
    })
}

pub fn point_feature(x: f64, y: f64, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": {"type": "Point", "coordinates": [x, y]}
    })
}

pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({"type": "FeatureCollection", "features": features})
}

pub fn json_upload(name: &str, document: &Value) -> RawFile {
    RawFile::new(name, "application/json", document.to_string().into_bytes())
}

fn bounds(rings: &[Vec<(f64, f64)>]) -> [f64; 4] {
    rings.iter().flatten().fold(
        [f64::MAX, f64::MAX, f64::MIN, f64::MIN],
        |[min_x, min_y, max_x, max_y], (x, y)| {
            [min_x.min(*x), min_y.min(*y), max_x.max(*x), max_y.max(*y)]
        },
    )
}

fn header(file_len_bytes: usize, bbox: [f64; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&9994_i32.to_be_bytes());
    out.extend_from_slice(&[0_u8; 20]);
    out.extend_from_slice(&((file_len_bytes / 2) as i32).to_be_bytes());
    out.extend_from_slice(&1000_i32.to_le_bytes());
    out.extend_from_slice(&SHAPE_POLYGON.to_le_bytes());
    for value in bbox {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&[0_u8; 32]);
    out
}

/// `.shp` and `.shx` bytes holding one single-ring polygon per record.
pub fn polygon_shapefile(polygons: &[Vec<(f64, f64)>]) -> (Vec<u8>, Vec<u8>) {
    let records: Vec<Vec<u8>> = polygons
        .iter()
        .map(|ring| {
            let [min_x, min_y, max_x, max_y] = bounds(std::slice::from_ref(ring));
            let mut content = Vec::new();
            content.extend_from_slice(&SHAPE_POLYGON.to_le_bytes());
            for value in [min_x, min_y, max_x, max_y] {
                content.extend_from_slice(&value.to_le_bytes());
            }
            content.extend_from_slice(&1_i32.to_le_bytes());
            content.extend_from_slice(&(ring.len() as i32).to_le_bytes());
            content.extend_from_slice(&0_i32.to_le_bytes());
            for (x, y) in ring {
                content.extend_from_slice(&x.to_le_bytes());
                content.extend_from_slice(&y.to_le_bytes());
            }
            content
        })
        .collect();

    let bbox = bounds(polygons);
    let shp_len = HEADER_LEN + records.iter().map(|r| 8 + r.len()).sum::<usize>();
    let mut shp = header(shp_len, bbox);
    let mut shx = header(HEADER_LEN + 8 * records.len(), bbox);

    for (i, content) in records.iter().enumerate() {
        let offset_words = (shp.len() / 2) as i32;
        let content_words = (content.len() / 2) as i32;
        shx.extend_from_slice(&offset_words.to_be_bytes());
        shx.extend_from_slice(&content_words.to_be_bytes());

        shp.extend_from_slice(&((i + 1) as i32).to_be_bytes());
        shp.extend_from_slice(&content_words.to_be_bytes());
        shp.extend_from_slice(content);
    }
    (shp, shx)
}

/// dBase III table with a single character column.
pub fn dbf_table(field: &str, values: &[&str]) -> Vec<u8> {
    const WIDTH: u8 = 16;
    let mut out = vec![0x03, 124, 1, 1];
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    out.extend_from_slice(&(32_u16 + 32 + 1).to_le_bytes());
    out.extend_from_slice(&(1_u16 + u16::from(WIDTH)).to_le_bytes());
    out.extend_from_slice(&[0_u8; 20]);

    let mut name = [0_u8; 11];
    for (slot, byte) in name.iter_mut().zip(field.bytes().take(10)) {
        *slot = byte;
    }
    out.extend_from_slice(&name);
    out.push(b'C');
    out.extend_from_slice(&[0_u8; 4]);
    out.push(WIDTH);
    out.push(0);
    out.extend_from_slice(&[0_u8; 14]);
    out.push(0x0D);

    for value in values {
        out.push(b' ');
        let mut cell = value.as_bytes().to_vec();
        cell.resize(usize::from(WIDTH), b' ');
        out.extend_from_slice(&cell);
    }
    out.push(0x1A);
    out
}

pub fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A complete single-layer bundle; `prj` is left out when `None`.
pub fn shapefile_bundle(layer: &str, polygons: &[Vec<(f64, f64)>], prj: Option<&str>) -> Vec<u8> {
    let (shp, shx) = polygon_shapefile(polygons);
    let names: Vec<String> = (0..polygons.len()).map(|i| format!("zone-{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let dbf = dbf_table("NAME", &name_refs);

    let shp_name = format!("{layer}.shp");
    let shx_name = format!("{layer}.shx");
    let dbf_name = format!("{layer}.dbf");
    let prj_name = format!("{layer}.prj");
    let mut entries: Vec<(&str, &[u8])> = vec![
        (shp_name.as_str(), shp.as_slice()),
        (shx_name.as_str(), shx.as_slice()),
        (dbf_name.as_str(), dbf.as_slice()),
    ];
    if let Some(prj) = prj {
        entries.push((prj_name.as_str(), prj.as_bytes()));
    }
    zip_entries(&entries)
}
