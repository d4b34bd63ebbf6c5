//! Result types returned by the ingestion orchestrator.

use geointake_core::{
    FileFormat, GeospatialInfo, ShapefileIncompleteError, ShapefileVerdict, UploadedFile,
    file_format_label,
};
use serde::Serialize;
use std::path::Path;

use crate::archive::{ArchiveExtractionError, ExtractionReport};
use crate::geospatial::GeospatialExtractionError;

/// Broad class of an ingestion issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// A file could not be classified, or nothing could.
    Classification,
    /// An archive could not be extracted.
    Extraction,
    /// A shapefile set is missing required components.
    ShapefileIncomplete,
    /// Metadata could not be derived from the primary file.
    GeospatialExtraction,
}

/// One reportable problem found while ingesting a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionIssue {
    /// Broad class of the problem.
    pub category: IssueCategory,
    /// Machine-readable kind, for example `aux_without_core`.
    pub error_kind: &'static str,
    /// Offending upload or extracted file, when one is to blame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// Missing shapefile components, in `.shp`, `.shx`, `.dbf` order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_files: Vec<String>,
}

impl IngestionIssue {
    pub(crate) fn unsupported_file(name: &str) -> Self {
        Self {
            category: IssueCategory::Classification,
            error_kind: "unsupported_format",
            file: Some(name.to_owned()),
            message: format!(
                "{name} ({}) is not a supported upload; use GeoJSON, shapefile components, ZIP or RAR",
                file_format_label(Path::new(name))
            ),
            missing_files: Vec::new(),
        }
    }

    pub(crate) fn no_supported_files() -> Self {
        Self {
            category: IssueCategory::Classification,
            error_kind: "no_supported_files",
            file: None,
            message: "the request contains no GeoJSON, shapefile or archive uploads".to_owned(),
            missing_files: Vec::new(),
        }
    }

    pub(crate) fn extraction(name: &str, err: &ArchiveExtractionError) -> Self {
        Self {
            category: IssueCategory::Extraction,
            error_kind: err.kind(),
            file: Some(name.to_owned()),
            message: err.to_string(),
            missing_files: Vec::new(),
        }
    }

    pub(crate) fn incomplete_shapefile(name: Option<&str>, err: &ShapefileIncompleteError) -> Self {
        let message = match name {
            Some(name) => format!("{name}: {err}"),
            None => err.to_string(),
        };
        Self {
            category: IssueCategory::ShapefileIncomplete,
            error_kind: err.kind.as_str(),
            file: name.map(str::to_owned),
            message,
            missing_files: err.missing_files.clone(),
        }
    }

    pub(crate) fn geospatial(name: &str, err: &GeospatialExtractionError) -> Self {
        Self {
            category: IssueCategory::GeospatialExtraction,
            error_kind: err.kind(),
            file: Some(name.to_owned()),
            message: err.to_string(),
            missing_files: Vec::new(),
        }
    }
}

/// An upload with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedFile {
    /// Original upload name.
    pub name: String,
    /// Pipeline classification.
    pub format: FileFormat,
    /// Human-readable format label.
    pub label: &'static str,
    /// Size reported by the upload layer.
    pub size_bytes: u64,
}

impl ClassifiedFile {
    pub(crate) fn new(file: &UploadedFile, format: FileFormat) -> Self {
        Self {
            name: file.original_name.clone(),
            format,
            label: file_format_label(Path::new(&file.original_name)),
            size_bytes: file.size_bytes,
        }
    }
}

/// An archive that was extracted and passed shapefile validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    /// Original upload name of the archive.
    pub name: String,
    /// Extraction details.
    #[serde(flatten)]
    pub extraction: ExtractionReport,
    /// Shapefile validation of the extracted contents.
    pub shapefile: ShapefileVerdict,
}

/// Terminal state of an ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum IngestionStatus {
    /// Files accepted and metadata derived.
    Complete {
        /// Metadata of the primary file.
        geospatial_info: GeospatialInfo,
    },
    /// Files accepted, but metadata could not be derived.
    MetadataIncomplete {
        /// Why extraction failed.
        reason: IngestionIssue,
    },
    /// The request was refused.
    Rejected {
        /// The issue that stopped the request.
        rejection: IngestionIssue,
    },
}

impl IngestionStatus {
    /// Status identifier as serialised.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::MetadataIncomplete { .. } => "metadata_incomplete",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Everything learned about one ingestion request.
///
/// `errors` lists every issue in the order it was found, including the one
/// carried by a `metadata_incomplete` or `rejected` status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionOutcome {
    /// Terminal state.
    #[serde(flatten)]
    pub status: IngestionStatus,
    /// File chosen for metadata extraction; archive members are named
    /// `archive/member`.
    pub primary_file: Option<String>,
    /// Every upload with its classification, in input order.
    pub files: Vec<ClassifiedFile>,
    /// Archives extracted before the request finished, in input order.
    pub archives: Vec<ArchiveSummary>,
    /// Issues in the order they were found.
    pub errors: Vec<IngestionIssue>,
}

impl IngestionOutcome {
    /// Metadata, when the request completed.
    #[must_use]
    pub fn geospatial_info(&self) -> Option<&GeospatialInfo> {
        match &self.status {
            IngestionStatus::Complete { geospatial_info } => Some(geospatial_info),
            IngestionStatus::MetadataIncomplete { .. } | IngestionStatus::Rejected { .. } => None,
        }
    }

    /// The rejecting issue, when the request was refused.
    #[must_use]
    pub fn rejection(&self) -> Option<&IngestionIssue> {
        match &self.status {
            IngestionStatus::Rejected { rejection } => Some(rejection),
            IngestionStatus::Complete { .. } | IngestionStatus::MetadataIncomplete { .. } => None,
        }
    }

    /// Whether files were accepted but metadata is missing.
    #[must_use]
    pub fn is_metadata_incomplete(&self) -> bool {
        matches!(self.status, IngestionStatus::MetadataIncomplete { .. })
    }
}

/// Accumulates the parts of an outcome while a request is processed.
#[derive(Debug, Default)]
pub(crate) struct OutcomeDraft {
    pub(crate) files: Vec<ClassifiedFile>,
    pub(crate) archives: Vec<ArchiveSummary>,
    pub(crate) errors: Vec<IngestionIssue>,
}

impl OutcomeDraft {
    pub(crate) fn reject(mut self, issue: IngestionIssue) -> IngestionOutcome {
        self.errors.push(issue.clone());
        self.finish(IngestionStatus::Rejected { rejection: issue }, None)
    }

    pub(crate) fn incomplete(mut self, issue: IngestionIssue, primary: String) -> IngestionOutcome {
        self.errors.push(issue.clone());
        self.finish(IngestionStatus::MetadataIncomplete { reason: issue }, Some(primary))
    }

    pub(crate) fn complete(self, info: GeospatialInfo, primary: String) -> IngestionOutcome {
        self.finish(
            IngestionStatus::Complete {
                geospatial_info: info,
            },
            Some(primary),
        )
    }

    fn finish(self, status: IngestionStatus, primary_file: Option<String>) -> IngestionOutcome {
        IngestionOutcome {
            status,
            primary_file,
            files: self.files,
            archives: self.archives,
            errors: self.errors,
        }
    }
}
