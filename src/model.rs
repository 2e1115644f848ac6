//! Values flowing through the ingestion pipeline.

use geojson::FeatureCollection;
use thiserror::Error;

use crate::error::ErrorCode;

/// One uploaded file as handed over by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Declared file name, extension included.
    pub name: String,
    /// Declared MIME type. May be empty or simply wrong.
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Lower-cased extension of the declared name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// A parsed feature collection together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCollection {
    /// Name of the uploaded file the collection was read from.
    pub file_name: String,
    /// Projection identifier declared by the file's metadata, e.g. `EPSG:4326`.
    pub projection: Option<String>,
    pub collection: FeatureCollection,
}

impl LoadedCollection {
    pub fn new(file_name: impl Into<String>, collection: FeatureCollection) -> Self {
        Self {
            file_name: file_name.into(),
            projection: None,
            collection,
        }
    }

    pub fn with_projection(mut self, projection: Option<String>) -> Self {
        self.projection = projection;
        self
    }

    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }
}

/// A non-fatal advisory attached to the batch outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub file_name: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, file_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code,
            file_name: file_name.into(),
            detail: detail.into(),
        }
    }
}

/// The single accepted collection of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub collection: LoadedCollection,
    /// Advisories collected across the batch, in input file order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Accepted {
    /// Whether any shapefile layer lacked its `.prj` component.
    pub fn missing_prj(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.code == ErrorCode::MissingProjection)
    }
}

/// Why a batch was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {detail}")]
pub struct Rejection {
    pub code: ErrorCode,
    pub detail: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Exactly one of these is produced per submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionOutcome {
    Accepted(Accepted),
    Rejected(Rejection),
}

impl IngestionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestionOutcome::Accepted(_))
    }

    /// The rejection code, if the batch was refused.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            IngestionOutcome::Accepted(_) => None,
            IngestionOutcome::Rejected(rejection) => Some(rejection.code),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            IngestionOutcome::Accepted(accepted) => &accepted.diagnostics,
            IngestionOutcome::Rejected(rejection) => &rejection.diagnostics,
        }
    }

    pub fn accepted(&self) -> Option<&Accepted> {
        match self {
            IngestionOutcome::Accepted(accepted) => Some(accepted),
            IngestionOutcome::Rejected(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Accepted, Rejection> {
        match self {
            IngestionOutcome::Accepted(accepted) => Ok(accepted),
            IngestionOutcome::Rejected(rejection) => Err(rejection),
        }
    }

    /// GeoJSON text of the accepted collection.
    pub fn to_geojson(&self) -> Option<String> {
        self.accepted()
            .map(|accepted| accepted.collection.collection.to_string())
    }
}
