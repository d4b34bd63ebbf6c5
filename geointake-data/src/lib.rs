//! Filesystem and external-tool side of geospatial upload ingestion.
//!
//! Responsibilities:
//! - Probe and run the external tools (`ogrinfo`, `unzip`, `unrar`) with
//!   timeouts and output caps.
//! - Extract archives through an ordered strategy chain with containment
//!   checks.
//! - Derive [`geointake_core::GeospatialInfo`] from GeoJSON and shapefiles.
//! - Orchestrate whole upload requests inside per-request workspaces.
//!
//! Boundaries:
//! - Do not encode classification or completeness rules (live in
//!   `geointake-core`).
//! - Keep blocking archive and file I/O off async executors.
//!
//! Invariants:
//! - Nothing is written outside a request workspace or an explicit
//!   extraction destination.
//! - No global mutable state; tool availability is probed once and passed
//!   in.

#![forbid(unsafe_code)]

pub mod archive;
mod blocking;
pub mod geospatial;
pub mod ingest;
pub mod toolchain;

pub use archive::{
    ArchiveExtractionError, ArchiveExtractor, ExtractionReport, ExtractionStrategy,
    ExtractionStrategyKind, LibraryStrategy, NativeToolStrategy, StrategyAttempt, StrategyError,
};
pub use geospatial::{
    ExtractionEnvelope, GDAL_INSTALL_HINT, GeospatialExtractionError, GeospatialInfoExtractor,
    parse_ogrinfo_report,
};
pub use ingest::{
    ArchiveSummary, ClassifiedFile, IngestError, IngestSettings, IngestionIssue,
    IngestionOrchestrator, IngestionOutcome, IngestionStatus, IssueCategory,
};
pub use toolchain::{
    DEFAULT_OUTPUT_LIMIT, DEFAULT_TOOL_TIMEOUT, ToolCapabilities, ToolCommand, ToolError,
    ToolLimits, ToolOutput, ToolSettings, run_tool,
};
