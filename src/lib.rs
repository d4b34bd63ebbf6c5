//! Facade crate for geospatial upload ingestion.
//!
//! This crate re-exports the pure domain types and, behind the `data`
//! feature, the extractors and request orchestrator that touch the
//! filesystem and external tools.

#![forbid(unsafe_code)]

pub use geointake_core::{
    ArchiveKind, AttributeField, AttributeType, BoundingBox, FileFormat, GeospatialInfo,
    ShapefileErrorKind, ShapefileIncompleteError, ShapefileVerdict, UploadedFile,
    file_format_label, is_supported_geospatial_format, validate_shapefile_files,
};

#[cfg(feature = "data")]
pub use geointake_data::{
    ArchiveExtractionError, ArchiveExtractor, ExtractionEnvelope, ExtractionReport,
    GeospatialExtractionError, GeospatialInfoExtractor, IngestError, IngestSettings,
    IngestionIssue, IngestionOrchestrator, IngestionOutcome, IngestionStatus, ToolCapabilities,
    ToolSettings,
};
