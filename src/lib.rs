//! Ingestion of user-uploaded geospatial files.
//!
//! GeoJSON documents and zipped Shapefile bundles are sniffed, converted to
//! GeoJSON feature collections, checked against a projection allowlist and
//! reduced to as few features as possible before they are handed to a
//! spatial-intersection engine.

use std::fs;
use std::io;
use std::path::Path;

pub mod config;
pub mod document;
pub mod error;
pub mod extent;
pub mod model;
pub mod optimizer;
pub mod pipeline;
pub mod projection;
pub mod shp;
pub mod sniff;

pub use config::IngestConfig;
pub use error::{ErrorCode, IngestError, ParseError};
pub use model::{Accepted, Diagnostic, IngestionOutcome, LoadedCollection, RawFile, Rejection};
pub use pipeline::IngestionPipeline;
pub use projection::ProjectionAllowlist;

/// Ingest one upload batch against `allowlist`.
pub async fn ingest(files: Vec<RawFile>, allowlist: ProjectionAllowlist) -> IngestionOutcome {
    IngestionPipeline::new(allowlist).ingest(files).await
}

/// [`ingest`] for callers without a Tokio runtime of their own.
pub fn ingest_blocking(
    files: Vec<RawFile>,
    allowlist: ProjectionAllowlist,
) -> io::Result<IngestionOutcome> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(ingest(files, allowlist)))
}

/// Read a file from disk as an upload with an optional declared MIME type.
pub fn read_raw_file(path: &Path, mime: Option<&str>) -> io::Result<RawFile> {
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");
    Ok(RawFile::new(name, mime.unwrap_or_default(), bytes))
}
