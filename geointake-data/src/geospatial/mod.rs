//! Structural metadata extraction for single geospatial files.
//!
//! GeoJSON is always summarised in process. Shapefiles are read through
//! `ogrinfo` when the capability probe found it and fail with installation
//! instructions otherwise; they are never approximated.

mod error;
mod report;


use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use geointake_core::{GeospatialInfo, file_format_label, summarise_geojson};
use geointake_fs::{open_utf8_file, utf8_path};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::toolchain::{ToolCapabilities, run_tool};

pub use error::{GDAL_INSTALL_HINT, GeospatialExtractionError};
pub use report::parse_ogrinfo_report;

/// Layer name used when a GeoJSON file has neither a `name` member nor a
/// usable file stem.
const FALLBACK_LAYER_NAME: &str = "layer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reader {
    GeoJson,
    Ogrinfo,
}

fn reader_for(path: &Path) -> Option<Reader> {
    let extension = path.extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
    match extension.as_str() {
        "geojson" | "json" => Some(Reader::GeoJson),
        "shp" => Some(Reader::Ogrinfo),
        _ => None,
    }
}

/// Derives [`GeospatialInfo`] from GeoJSON and shapefile inputs.
#[derive(Debug, Clone)]
pub struct GeospatialInfoExtractor {
    capabilities: Arc<ToolCapabilities>,
}

impl GeospatialInfoExtractor {
    /// Build an extractor over the probed tool capabilities.
    #[must_use]
    pub fn new(capabilities: Arc<ToolCapabilities>) -> Self {
        Self { capabilities }
    }

    /// Extract metadata from `path`, choosing a reader by extension.
    ///
    /// # Errors
    /// Returns [`GeospatialExtractionError`] when the format is not readable,
    /// `ogrinfo` is needed but missing or fails, or the GeoJSON is malformed.
    pub async fn extract(&self, path: &Path) -> Result<GeospatialInfo, GeospatialExtractionError> {
        match reader_for(path) {
            Some(Reader::GeoJson) => read_geojson(path).await,
            Some(Reader::Ogrinfo) => self.read_with_ogrinfo(path).await,
            None => Err(GeospatialExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                label: file_format_label(path),
            }),
        }
    }

    /// Extract metadata and wrap the outcome in a serialisable envelope.
    ///
    /// # Examples
    /// ```
    /// use std::{path::Path, sync::Arc};
    /// use geointake_data::{GeospatialInfoExtractor, ToolCapabilities};
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime").block_on(async {
    /// let extractor = GeospatialInfoExtractor::new(Arc::new(ToolCapabilities::none()));
    /// let envelope = extractor.extract_geospatial_info(Path::new("parcels.shp")).await;
    /// assert!(!envelope.success);
    /// assert_eq!(envelope.error_kind, Some("tool_unavailable"));
    /// # });
    /// ```
    pub async fn extract_geospatial_info(&self, path: &Path) -> ExtractionEnvelope {
        ExtractionEnvelope::from(self.extract(path).await)
    }

    async fn read_with_ogrinfo(
        &self,
        path: &Path,
    ) -> Result<GeospatialInfo, GeospatialExtractionError> {
        let Some(command) = self.capabilities.ogrinfo.as_ref() else {
            return Err(GeospatialExtractionError::ToolUnavailable {
                path: path.to_path_buf(),
                format: "Shapefile",
            });
        };
        debug!("reading {} with {}", path.display(), command.name());
        let args: [OsString; 4] = ["-ro".into(), "-so".into(), "-al".into(), path.into()];
        let output = run_tool(command, args, &self.capabilities.limits)
            .await
            .map_err(|err| GeospatialExtractionError::from_tool(path.to_path_buf(), err))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            if stdout.trim().is_empty() {
                let stderr = output.stderr_text();
                return Err(GeospatialExtractionError::ToolFailed {
                    path: path.to_path_buf(),
                    message: if stderr.is_empty() {
                        format!("exited with {}", output.status)
                    } else {
                        stderr
                    },
                });
            }
            warn!(
                "{} exited with {} for {}; using its partial report",
                command.name(),
                output.status,
                path.display()
            );
        }
        parse_ogrinfo_report(&stdout).ok_or_else(|| GeospatialExtractionError::ToolFailed {
            path: path.to_path_buf(),
            message: "report did not describe any layer".to_owned(),
        })
    }
}

async fn read_geojson(path: &Path) -> Result<GeospatialInfo, GeospatialExtractionError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || summarise_geojson_file(&owned))
        .await
        .map_err(|source| GeospatialExtractionError::Task {
            path: path.to_path_buf(),
            source,
        })?
}

fn summarise_geojson_file(path: &Path) -> Result<GeospatialInfo, GeospatialExtractionError> {
    let io_error = |source: std::io::Error| GeospatialExtractionError::Io {
        source,
        path: path.to_path_buf(),
    };
    let mut bytes = Vec::new();
    open_utf8_file(utf8_path(path).map_err(io_error)?)
        .map_err(io_error)?
        .read_to_end(&mut bytes)
        .map_err(io_error)?;
    let document: Value = simd_json::serde::from_slice(&mut bytes).map_err(|source| {
        GeospatialExtractionError::InvalidJson {
            path: path.to_path_buf(),
            source,
        }
    })?;
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or(FALLBACK_LAYER_NAME);
    summarise_geojson(&document, stem).map_err(|source| GeospatialExtractionError::InvalidGeoJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialisable `{success, data, error}` view of an extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionEnvelope {
    /// Whether metadata was derived.
    pub success: bool,
    /// Metadata on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<GeospatialInfo>,
    /// Human-readable failure on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure kind on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl From<Result<GeospatialInfo, GeospatialExtractionError>> for ExtractionEnvelope {
    fn from(result: Result<GeospatialInfo, GeospatialExtractionError>) -> Self {
        match result {
            Ok(info) => Self {
                success: true,
                data: Some(info),
                error: None,
                error_kind: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(err.to_string()),
                error_kind: Some(err.kind()),
            },
        }
    }
}
