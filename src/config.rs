//! Host configuration consumed by the pipeline.
//!
//! The host publishes its projection definitions the way map viewers do in
//! their local configuration:
//!
//! ```json
//! { "projectionDefs": [ { "code": "EPSG:2154", "def": "+proj=lcc ...",
//!                         "extent": [-378305.81, 6093283.21, 1212610.74, 7186901.68] } ] }
//! ```
//!
//! Only `code` and `extent` are read.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::extent::Extent;
use crate::projection::ProjectionAllowlist;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestConfig {
    #[serde(default)]
    pub projection_defs: Vec<ProjectionDef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProjectionDef {
    pub code: String,
    #[serde(default)]
    pub extent: Option<Vec<f64>>,
}

impl IngestConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse { source })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Append plain projection codes, e.g. from the command line.
    pub fn with_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection_defs
            .extend(codes.into_iter().map(|code| ProjectionDef {
                code: code.into(),
                extent: None,
            }));
        self
    }

    /// Configured codes plus the built-in defaults.
    pub fn allowlist(&self) -> ProjectionAllowlist {
        self.projection_defs
            .iter()
            .fold(ProjectionAllowlist::default(), |list, def| {
                let extent = def.extent.as_deref().and_then(Extent::from_slice);
                list.with_code(&def.code, extent)
            })
    }
}
