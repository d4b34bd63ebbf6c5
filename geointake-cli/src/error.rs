//! Error types emitted by the geointake CLI.
//!
//! Upload problems (unsupported formats, incomplete shapefiles, missing
//! GDAL) are part of the printed outcome, not errors; only failures that
//! prevent an outcome from being produced end up here.

use std::sync::Arc;

use camino::Utf8PathBuf;
use geointake_data::IngestError;
use thiserror::Error;

/// Errors emitted by the geointake CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (pass at least one {field} or set {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option holds a value outside its accepted range.
    #[error("invalid --{field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Ingestion could not produce an outcome.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Serializing the outcome failed.
    #[error("failed to serialize outcome: {0}")]
    SerializeOutcome(#[source] serde_json::Error),
    /// Writing the outcome failed.
    #[error("failed to write outcome: {0}")]
    WriteOutput(#[source] std::io::Error),
}
