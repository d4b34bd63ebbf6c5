//! Extension-based classification of uploaded files.
//!
//! Classification is total: every file name maps to exactly one
//! [`FileFormat`], comparing extensions case-insensitively.
//!
//! # Examples
//! ```
//! use geointake_core::{ArchiveKind, FileFormat};
//!
//! assert_eq!(FileFormat::classify("Jakarta.GeoJSON"), FileFormat::GeoJson);
//! assert_eq!(FileFormat::classify("parcel.SHX"), FileFormat::ShapefileComponent);
//! assert_eq!(FileFormat::classify("bundle.zip"), FileFormat::Archive(ArchiveKind::Zip));
//! assert_eq!(FileFormat::classify("notes.txt"), FileFormat::Unknown);
//! ```

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::shapefile::{SHAPEFILE_AUXILIARY, SHAPEFILE_CORE};

const GEOJSON_EXTENSIONS: [&str; 2] = [".geojson", ".json"];

/// Archive containers the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    /// PKZIP archive (`.zip`).
    Zip,
    /// RAR archive (`.rar`).
    Rar,
}

impl ArchiveKind {
    /// Return the archive kind as a lowercase `&str`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse format class assigned to an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// A GeoJSON document.
    #[serde(rename = "geojson")]
    GeoJson,
    /// One member of an ESRI shapefile component set.
    ShapefileComponent,
    /// An archive that must be extracted before inspection.
    Archive(ArchiveKind),
    /// Anything else. Rejected before extraction.
    Unknown,
}

impl FileFormat {
    /// Classify `path` by its (case-insensitive) extension.
    #[must_use]
    pub fn classify(path: impl AsRef<Path>) -> Self {
        let Some(extension) = dotted_extension(path.as_ref()) else {
            return Self::Unknown;
        };
        let extension = extension.as_str();
        if GEOJSON_EXTENSIONS.contains(&extension) {
            Self::GeoJson
        } else if SHAPEFILE_CORE.contains(&extension) || SHAPEFILE_AUXILIARY.contains(&extension)
        {
            Self::ShapefileComponent
        } else {
            match extension {
                ".zip" => Self::Archive(ArchiveKind::Zip),
                ".rar" => Self::Archive(ArchiveKind::Rar),
                _ => Self::Unknown,
            }
        }
    }

    /// Return the class as a lowercase `&str`.
    ///
    /// # Examples
    /// ```
    /// use geointake_core::FileFormat;
    ///
    /// assert_eq!(FileFormat::GeoJson.as_str(), "geojson");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GeoJson => "geojson",
            Self::ShapefileComponent => "shapefile_component",
            Self::Archive(_) => "archive",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the pipeline accepts files of this class.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return the lower-cased extension of `path` including its leading dot.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use geointake_core::dotted_extension;
///
/// assert_eq!(dotted_extension(Path::new("a/B.SHP")).as_deref(), Some(".shp"));
/// assert_eq!(dotted_extension(Path::new("README")), None);
/// ```
#[must_use]
pub fn dotted_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?;
    if extension.is_empty() {
        return None;
    }
    Some(format!(".{}", extension.to_ascii_lowercase()))
}

/// Human-readable label for the format of `path`.
///
/// Raster, KML and GML formats receive a label even though ingestion
/// classifies them as [`FileFormat::Unknown`].
///
/// # Examples
/// ```
/// use std::path::Path;
/// use geointake_core::file_format_label;
///
/// assert_eq!(file_format_label(Path::new("roads.shp")), "Shapefile");
/// assert_eq!(file_format_label(Path::new("dem.tif")), "GeoTIFF");
/// ```
#[must_use]
pub fn file_format_label(path: &Path) -> &'static str {
    match dotted_extension(path).as_deref() {
        Some(".geojson" | ".json") => "GeoJSON",
        Some(".shp" | ".shx" | ".dbf" | ".prj" | ".cpg" | ".sbn" | ".sbx") => "Shapefile",
        Some(".zip") => "ZIP Archive",
        Some(".rar") => "RAR Archive",
        Some(".kml") => "KML",
        Some(".kmz") => "KMZ",
        Some(".gml") => "GML",
        Some(".gpkg") => "GeoPackage",
        Some(".tif" | ".tiff") => "GeoTIFF",
        Some(".csv") => "CSV",
        _ => "Unknown",
    }
}

/// Whether the geospatial extractor can read `path` directly.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use geointake_core::is_supported_geospatial_format;
///
/// assert!(is_supported_geospatial_format(Path::new("city.geojson")));
/// assert!(!is_supported_geospatial_format(Path::new("city.dbf")));
/// ```
#[must_use]
pub fn is_supported_geospatial_format(path: &Path) -> bool {
    matches!(
        dotted_extension(path).as_deref(),
        Some(".geojson" | ".json" | ".shp")
    )
}
