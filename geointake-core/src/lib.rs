//! Core domain types for geospatial upload ingestion.
//!
//! Everything here is pure: classification, shapefile completeness rules,
//! bounding-box reduction and GeoJSON summaries operate on names and parsed
//! values only. Filesystem access and external tools live in
//! `geointake-data`.

#![forbid(unsafe_code)]

pub mod bounds;
pub mod format;
pub mod geojson;
pub mod info;
pub mod shapefile;
pub mod upload;

pub use bounds::{BoundingBox, BoundsAccumulator, MAX_COORDINATE_DEPTH, coordinate_bounds};
pub use format::{
    ArchiveKind, FileFormat, dotted_extension, file_format_label, is_supported_geospatial_format,
};
pub use geojson::{GeoJsonError, summarise_geojson};
pub use info::{
    AttributeField, AttributeType, DEFAULT_COORDINATE_SYSTEM, GeospatialInfo,
    UNKNOWN_GEOMETRY_TYPE,
};
pub use shapefile::{
    SHAPEFILE_AUXILIARY, SHAPEFILE_CORE, ShapefileErrorKind, ShapefileIncompleteError,
    ShapefileVerdict, validate_shapefile_extensions, validate_shapefile_files,
};
pub use upload::UploadedFile;
