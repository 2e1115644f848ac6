//! Batch orchestration: sniff, parse and validate every file concurrently,
//! then decide the single outcome of the upload.
//!
//! Each file is an independent blocking task owning its [`RawFile`]; the
//! only shared value is the read-only [`ProjectionAllowlist`]. Tasks are
//! joined in input order before the batch stages run:
//!
//! 1. the first fatal per-file failure, in input order, rejects the batch;
//! 2. exactly one non-empty collection must remain (cardinality);
//! 3. its coordinates must fit the extent of its projection;
//! 4. its polygons are merged by the optimizer.

use std::sync::Arc;

use futures_util::future::join_all;
use log::{debug, info, warn};
use tokio::task;

use crate::document;
use crate::error::{ErrorCode, IngestError, ProjectionError};
use crate::extent;
use crate::model::{Accepted, Diagnostic, IngestionOutcome, LoadedCollection, RawFile, Rejection};
use crate::optimizer;
use crate::projection::{self, ProjectionAllowlist, Verdict};
use crate::shp;
use crate::sniff::{self, FileKind};

/// What one file's unit of work produced.
#[derive(Debug)]
pub enum FileReport {
    Loaded {
        collections: Vec<LoadedCollection>,
        diagnostics: Vec<Diagnostic>,
    },
    /// Neither JSON nor ZIP. Never fatal on its own.
    Unsupported(Diagnostic),
    Failed(IngestError),
}

#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    allowlist: Arc<ProjectionAllowlist>,
}

impl IngestionPipeline {
    pub fn new(allowlist: ProjectionAllowlist) -> Self {
        Self {
            allowlist: Arc::new(allowlist),
        }
    }

    pub fn allowlist(&self) -> &ProjectionAllowlist {
        &self.allowlist
    }

    /// Process a batch of files submitted together.
    ///
    /// Every file runs to completion even when a sibling fails; results are
    /// only discounted afterwards.
    pub async fn ingest(&self, files: Vec<RawFile>) -> IngestionOutcome {
        debug!("Ingesting batch of {} files", files.len());
        let (names, handles): (Vec<_>, Vec<_>) = files
            .into_iter()
            .map(|file| {
                let allowlist = Arc::clone(&self.allowlist);
                let name = file.name.clone();
                let handle = task::spawn_blocking(move || process_file(&file, &allowlist));
                (name, handle)
            })
            .unzip();

        let reports = join_all(handles)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, file)| {
                joined.unwrap_or_else(|source| {
                    FileReport::Failed(IngestError::Aborted { file, source })
                })
            })
            .collect();
        self.aggregate(reports)
    }

    /// Reduce per-file reports, in input order, to the batch outcome.
    pub fn aggregate(&self, reports: Vec<FileReport>) -> IngestionOutcome {
        let mut diagnostics = Vec::new();
        let mut collections = Vec::new();
        let mut failure: Option<IngestError> = None;

        for report in reports {
            match report {
                FileReport::Loaded {
                    collections: loaded,
                    diagnostics: advisories,
                } => {
                    collections.extend(loaded);
                    diagnostics.extend(advisories);
                }
                FileReport::Unsupported(diagnostic) => diagnostics.push(diagnostic),
                FileReport::Failed(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    } else {
                        debug!("Discarding additional failure: {err}");
                    }
                }
            }
        }

        if let Some(err) = failure {
            return reject(err.code(), err.to_string(), diagnostics);
        }

        let collection = match single_collection(collections) {
            Ok(collection) => collection,
            Err(count) => {
                return reject(
                    ErrorCode::GenericLoadError,
                    format!("expected exactly one non-empty feature collection, found {count}"),
                    diagnostics,
                );
            }
        };

        if let Some(extent) = self.allowlist.extent_for(collection.projection.as_deref()) {
            if !extent::fits(&collection.collection, &extent) {
                return reject(
                    ErrorCode::FileBeyondBoundaries,
                    format!(
                        "{} has coordinates outside the extent of {}",
                        collection.file_name,
                        collection.projection.as_deref().unwrap_or(projection::WGS84)
                    ),
                    diagnostics,
                );
            }
        }

        let collection = optimizer::optimize(collection);
        info!(
            "Accepted {} with {} features",
            collection.file_name,
            collection.len()
        );
        IngestionOutcome::Accepted(Accepted {
            collection,
            diagnostics,
        })
    }
}

/// Sniff, parse and validate one file.
pub fn process_file(file: &RawFile, allowlist: &ProjectionAllowlist) -> FileReport {
    let loaded = match sniff::classify(file) {
        FileKind::Unsupported => {
            warn!("{} is neither JSON nor a ZIP archive", file.name);
            return FileReport::Unsupported(Diagnostic::new(
                ErrorCode::UnsupportedFileType,
                file.name.clone(),
                "file is neither JSON nor a ZIP archive",
            ));
        }
        FileKind::Json => load_json(file, allowlist).map(|collections| (collections, Vec::new())),
        FileKind::Zip => load_shapefile(file, allowlist),
    };
    match loaded {
        Ok((collections, diagnostics)) => FileReport::Loaded {
            collections,
            diagnostics,
        },
        Err(err) => {
            warn!("{} rejected: {}", file.name, err);
            FileReport::Failed(err)
        }
    }
}

fn load_json(
    file: &RawFile,
    allowlist: &ProjectionAllowlist,
) -> Result<Vec<LoadedCollection>, IngestError> {
    let loaded = document::read_document(file)?;
    match projection::validate(&loaded, allowlist) {
        Verdict::Reject(projection) => Err(unsupported(file, projection)),
        Verdict::Pass | Verdict::PassUndeclared => Ok(vec![loaded]),
    }
}

fn load_shapefile(
    file: &RawFile,
    allowlist: &ProjectionAllowlist,
) -> Result<(Vec<LoadedCollection>, Vec<Diagnostic>), IngestError> {
    let conversion = shp::convert(file)?;
    let diagnostics = conversion
        .missing_prj
        .iter()
        .map(|layer| {
            Diagnostic::new(
                ErrorCode::MissingProjection,
                file.name.clone(),
                format!("layer {layer} has no .prj component"),
            )
        })
        .collect();
    match projection::validate_layers(&conversion.layers, allowlist) {
        Verdict::Reject(projection) => Err(unsupported(file, projection)),
        Verdict::Pass | Verdict::PassUndeclared => Ok((conversion.layers, diagnostics)),
    }
}

fn unsupported(file: &RawFile, projection: String) -> IngestError {
    ProjectionError::Unsupported {
        file: file.name.clone(),
        projection,
    }
    .into()
}

/// Cardinality stage: keep the non-empty collections and require exactly
/// one. Returns the number found otherwise.
///
/// Every shapefile layer counts on its own, so a single archive holding two
/// non-empty layers is refused just like two uploaded files. Map viewers
/// that count one result per uploaded file would accept such an archive.
pub fn single_collection(collections: Vec<LoadedCollection>) -> Result<LoadedCollection, usize> {
    let mut qualifying: Vec<_> = collections
        .into_iter()
        .filter(|collection| !collection.is_empty())
        .collect();
    match qualifying.len() {
        1 => qualifying.pop().ok_or(0),
        count => Err(count),
    }
}

fn reject(code: ErrorCode, detail: String, diagnostics: Vec<Diagnostic>) -> IngestionOutcome {
    info!("Rejected batch: {} ({})", code, detail);
    IngestionOutcome::Rejected(Rejection {
        code,
        detail,
        diagnostics,
    })
}
