//! Error types produced while extracting archives.

use std::{io, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::toolchain::ToolError;

use super::ExtractionStrategyKind;

/// Why a single extraction strategy failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StrategyError {
    /// The strategy needs a tool that the capability probe did not find.
    #[error("{tool} is not available")]
    ToolUnavailable { tool: String },
    /// Running the native tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// The archive library rejected the archive.
    #[error("failed to read archive: {message}")]
    Archive { message: String },
    /// Reading the archive or writing an entry failed.
    #[error("I/O error at {path:?}: {source}")]
    Io { source: io::Error, path: PathBuf },
    /// An entry name resolves outside the destination.
    #[error("entry {entry:?} escapes the extraction directory")]
    TraversalDetected { entry: String },
    /// The blocking extraction task did not complete.
    #[error("extraction task failed: {source}")]
    Task { source: tokio::task::JoinError },
}

/// Diagnostic recorded for a strategy that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    /// Strategy that was tried.
    pub strategy: ExtractionStrategyKind,
    /// Human-readable failure reason.
    pub detail: String,
}

impl StrategyAttempt {
    pub(crate) fn new(strategy: ExtractionStrategyKind, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            detail: detail.into(),
        }
    }
}

fn describe_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no extraction strategy is configured".to_owned();
    }
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.strategy, attempt.detail))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by [`super::ArchiveExtractor`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveExtractionError {
    /// The path does not name a zip or rar archive.
    #[error("{path:?} is not a supported archive")]
    NotAnArchive { path: PathBuf },
    /// The destination directory could not be prepared.
    #[error("failed to prepare extraction directory {path:?}: {source}")]
    Destination { source: io::Error, path: PathBuf },
    /// The destination already holds entries that extraction would mix
    /// with or remove.
    #[error("extraction directory {path:?} is not empty")]
    DestinationNotEmpty { path: PathBuf },
    /// An entry would be written outside the destination.
    #[error("archive {archive:?} contains entry {entry:?} that escapes the extraction directory")]
    TraversalDetected { archive: PathBuf, entry: String },
    /// Every strategy failed or produced no files.
    #[error("failed to extract {archive:?}: {}", describe_attempts(.attempts))]
    AllStrategiesFailed {
        archive: PathBuf,
        attempts: Vec<StrategyAttempt>,
    },
}

impl ArchiveExtractionError {
    /// Machine-readable error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAnArchive { .. } => "not_an_archive",
            Self::Destination { .. } => "extraction_setup_failed",
            Self::DestinationNotEmpty { .. } => "destination_not_empty",
            Self::TraversalDetected { .. } => "traversal_detected",
            Self::AllStrategiesFailed { .. } => "extraction_failed",
        }
    }

    /// Strategy diagnostics gathered before the failure.
    #[must_use]
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            Self::AllStrategiesFailed { attempts, .. } => attempts,
            Self::NotAnArchive { .. }
            | Self::Destination { .. }
            | Self::DestinationNotEmpty { .. }
            | Self::TraversalDetected { .. } => &[],
        }
    }
}
