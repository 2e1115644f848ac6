//! Error taxonomy shared by every ingestion stage.
//!
//! Low-level failures (`serde_json`, `zip`, `shapefile`, ...) never leave a
//! file's unit of work raw: they are wrapped in [`ParseError`] or
//! [`ProjectionError`] and reduced to an [`ErrorCode`] when the batch outcome
//! is assembled.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Classified outcome codes reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Sniffing could not classify a file as JSON or ZIP.
    UnsupportedFileType,
    /// JSON syntax error or a ZIP container that cannot be opened.
    DocumentUnreadable,
    /// A declared projection is absent from the allowlist.
    UnsupportedProjection,
    /// Any other structural problem, including batch cardinality.
    GenericLoadError,
    /// Non-fatal: a shapefile layer ships without its `.prj` component.
    MissingProjection,
    /// The accepted geometry leaves the valid extent of its projection.
    FileBeyondBoundaries,
}

impl ErrorCode {
    /// Message key understood by the upload dialog's translation bundle.
    pub fn message_key(self) -> &'static str {
        match self {
            ErrorCode::UnsupportedFileType => "knowledgeReport.errors.fileNotSupported",
            ErrorCode::DocumentUnreadable => "shapefile.error.shapeFileParsingError",
            ErrorCode::UnsupportedProjection => "shapefile.error.projectionNotSupported",
            ErrorCode::GenericLoadError => "shapefile.error.genericLoadError",
            ErrorCode::MissingProjection => "shapefile.error.missingPrj",
            ErrorCode::FileBeyondBoundaries => "knowledgeReport.errors.fileBeyondBoundaries",
        }
    }

    /// Whether this code blocks acceptance of the batch.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            ErrorCode::MissingProjection | ErrorCode::UnsupportedFileType
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message_key())
    }
}

/// Failures raised while turning one uploaded file into feature collections.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{file} is not readable JSON")]
    InvalidJson {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{file} is JSON but not a GeoJSON object")]
    NotGeoJson {
        file: String,
        #[source]
        source: geojson::Error,
    },
    #[error("{file} is not a readable ZIP archive")]
    Corrupt {
        file: String,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to extract {entry} from {file}")]
    Archive {
        file: String,
        entry: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt shape data in layer {layer} of {file}")]
    ShapeData {
        file: String,
        layer: String,
        #[source]
        source: shapefile::Error,
    },
    #[error("unreadable attribute table in layer {layer} of {file}")]
    Attributes {
        file: String,
        layer: String,
        #[source]
        source: shapefile::dbase::Error,
    },
    #[error("{file} contains no .shp layer")]
    NoLayers { file: String },
}

impl ParseError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ParseError::InvalidJson { .. } | ParseError::Corrupt { .. } => {
                ErrorCode::DocumentUnreadable
            }
            ParseError::NotGeoJson { .. }
            | ParseError::Archive { .. }
            | ParseError::ShapeData { .. }
            | ParseError::Attributes { .. }
            | ParseError::NoLayers { .. } => ErrorCode::GenericLoadError,
        }
    }
}

/// Raised when a declared projection is not in the allowlist.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("projection {projection} declared by {file} is not supported")]
    Unsupported { file: String, projection: String },
}

impl ProjectionError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::UnsupportedProjection
    }
}

/// Why one file's unit of work failed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error("processing of {file} was aborted")]
    Aborted {
        file: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl IngestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IngestError::Parse(err) => err.code(),
            IngestError::Projection(err) => err.code(),
            IngestError::Aborted { .. } => ErrorCode::GenericLoadError,
        }
    }
}

/// Union failures. These are recovered inside the optimizer and only logged.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("feature {index} has a ring with {positions} positions")]
    MalformedRing { index: usize, positions: usize },
    #[error("feature {index} has a position that is not a finite 2D coordinate")]
    InvalidPosition { index: usize },
    #[error("polygon union panicked: {message}")]
    UnionPanicked { message: String },
}

/// Errors raised while loading host configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration document")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}
