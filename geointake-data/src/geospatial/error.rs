//! Errors raised while deriving geospatial metadata.

use std::{io, path::PathBuf, time::Duration};

use geointake_core::GeoJsonError;
use thiserror::Error;

use crate::toolchain::ToolError;

/// Instructions shown when a format needs GDAL and it is missing.
pub const GDAL_INSTALL_HINT: &str = "install GDAL so that `ogrinfo` is on PATH \
     (for example `apt install gdal-bin`, `brew install gdal` or `conda install gdal`)";

/// Why metadata could not be derived from a file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeospatialExtractionError {
    /// The format can only be read with `ogrinfo`, which is not installed.
    #[error("reading {format} data from {path:?} requires GDAL's ogrinfo: {}", GDAL_INSTALL_HINT)]
    ToolUnavailable { path: PathBuf, format: &'static str },
    /// `ogrinfo` overran its timeout.
    #[error("ogrinfo timed out after {}s reading {path:?}", .timeout.as_secs_f32())]
    Timeout { path: PathBuf, timeout: Duration },
    /// `ogrinfo` printed more than the output cap.
    #[error("ogrinfo output for {path:?} exceeded {limit} bytes")]
    OutputTooLarge { path: PathBuf, limit: usize },
    /// `ogrinfo` failed or printed an unusable report.
    #[error("ogrinfo failed for {path:?}: {message}")]
    ToolFailed { path: PathBuf, message: String },
    /// The file is not well-formed JSON.
    #[error("{path:?} is not valid JSON: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: simd_json::Error,
    },
    /// The JSON is not a feature collection or feature.
    #[error("{path:?} is not usable GeoJSON: {source}")]
    InvalidGeoJson {
        path: PathBuf,
        #[source]
        source: GeoJsonError,
    },
    /// The file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io { source: io::Error, path: PathBuf },
    /// The format carries no readable geometry on its own.
    #[error("{path:?} ({label}) cannot be inspected; upload a .shp or GeoJSON file")]
    UnsupportedFormat { path: PathBuf, label: &'static str },
    /// The blocking parse task did not complete.
    #[error("parsing {path:?} did not complete: {source}")]
    Task {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl GeospatialExtractionError {
    /// Machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolUnavailable { .. } => "tool_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::OutputTooLarge { .. } => "output_too_large",
            Self::ToolFailed { .. } => "tool_failed",
            Self::InvalidJson { .. } | Self::InvalidGeoJson { .. } => "parse_error",
            Self::Io { .. } => "io_error",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Task { .. } => "internal_error",
        }
    }

    pub(crate) fn from_tool(path: PathBuf, err: ToolError) -> Self {
        match err {
            ToolError::Timeout { timeout, .. } => Self::Timeout { path, timeout },
            ToolError::OutputTooLarge { limit, .. } => Self::OutputTooLarge { path, limit },
            ToolError::Io { source, .. } => Self::Io { source, path },
            other @ (ToolError::Spawn { .. } | ToolError::Failed { .. }) => Self::ToolFailed {
                path,
                message: other.to_string(),
            },
        }
    }
}
