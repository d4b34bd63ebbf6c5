//! Completeness rules for ESRI shapefile component sets.
//!
//! A shapefile is only usable when its three core members (`.shp`, `.shx`,
//! `.dbf`) travel together. Auxiliary members (`.prj`, `.cpg`, `.sbn`,
//! `.sbx`) are optional but meaningless on their own. The verdict is a single
//! decision over four presence flags; a set with no shapefile members at all
//! is accepted because it simply is not a shapefile upload.
//!
//! # Examples
//! ```
//! use geointake_core::{ShapefileErrorKind, validate_shapefile_extensions};
//!
//! let verdict = validate_shapefile_extensions([".shp", ".cpg"]);
//! assert!(!verdict.accepted);
//! assert_eq!(
//!     verdict.error_kind,
//!     Some(ShapefileErrorKind::IncompleteShapefileWithAuxiliary)
//! );
//! assert_eq!(verdict.missing_files, vec![".shx", ".dbf"]);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::format::dotted_extension;

/// Shapefile members that must all be present.
pub const SHAPEFILE_CORE: [&str; 3] = [".shp", ".shx", ".dbf"];

/// Optional shapefile members.
pub const SHAPEFILE_AUXILIARY: [&str; 4] = [".prj", ".cpg", ".sbn", ".sbx"];

/// Machine-checkable reason a shapefile set was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapefileErrorKind {
    /// Auxiliary members arrived without any core member.
    AuxWithoutCore,
    /// Only `.shp` plus auxiliary members were supplied.
    IncompleteShapefileWithAuxiliary,
    /// Only `.shp` was supplied.
    IncompleteShapefile,
    /// `.shp` and `.dbf` were supplied without `.shx`.
    MissingShx,
    /// `.shp` and `.shx` were supplied without `.dbf`.
    MissingDbf,
    /// `.shx` or `.dbf` were supplied without `.shp`.
    ShxOrDbfWithoutShp,
}

impl ShapefileErrorKind {
    /// Return the kind as a `snake_case` identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuxWithoutCore => "aux_without_core",
            Self::IncompleteShapefileWithAuxiliary => "incomplete_shapefile_with_auxiliary",
            Self::IncompleteShapefile => "incomplete_shapefile",
            Self::MissingShx => "missing_shx",
            Self::MissingDbf => "missing_dbf",
            Self::ShxOrDbfWithoutShp => "shx_or_dbf_without_shp",
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            Self::AuxWithoutCore => {
                "only auxiliary shapefile files were found; the core shapefile files are missing"
            }
            Self::IncompleteShapefileWithAuxiliary => {
                "the .shp file came with auxiliary files but without its index and attribute files"
            }
            Self::IncompleteShapefile => {
                "the .shp file came without its index and attribute files"
            }
            Self::MissingShx => "the shapefile index (.shx) is missing",
            Self::MissingDbf => "the shapefile attribute table (.dbf) is missing",
            Self::ShxOrDbfWithoutShp => "shapefile index or attribute files came without a .shp file",
        }
    }
}

impl fmt::Display for ShapefileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection raised for an incomplete shapefile set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "incomplete shapefile: {} (missing: {})",
    .kind.describe(),
    .missing_files.join(", ")
)]
pub struct ShapefileIncompleteError {
    /// Reason for the rejection.
    pub kind: ShapefileErrorKind,
    /// Core extensions that were not found, in `.shp`, `.shx`, `.dbf` order.
    pub missing_files: Vec<String>,
}

/// Outcome of validating one set of shapefile members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapefileVerdict {
    /// Whether the set may proceed.
    pub accepted: bool,
    /// Core extensions found, in canonical order.
    pub present_core_extensions: Vec<String>,
    /// Auxiliary extensions found, in canonical order.
    pub present_auxiliary_extensions: Vec<String>,
    /// Reason for the rejection, when rejected.
    pub error_kind: Option<ShapefileErrorKind>,
    /// Missing core extensions, empty when accepted.
    pub missing_files: Vec<String>,
}

impl ShapefileVerdict {
    /// Convert the verdict into a `Result`, surfacing rejections as errors.
    ///
    /// # Errors
    /// Returns [`ShapefileIncompleteError`] when the set was rejected.
    pub fn into_result(self) -> Result<Self, ShapefileIncompleteError> {
        match self.error_kind {
            Some(kind) => Err(ShapefileIncompleteError {
                kind,
                missing_files: self.missing_files,
            }),
            None => Ok(self),
        }
    }
}

/// Validate a set of extensions (with or without the leading dot).
///
/// Extensions are compared case-insensitively; anything that is not a
/// shapefile member is ignored.
#[must_use]
pub fn validate_shapefile_extensions<I, S>(extensions: I) -> ShapefileVerdict
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let present: BTreeSet<String> = extensions
        .into_iter()
        .map(|extension| normalise_extension(extension.as_ref()))
        .collect();
    decide(&present)
}

/// Validate the shapefile members among a list of file names or paths.
///
/// # Examples
/// ```
/// use geointake_core::validate_shapefile_files;
///
/// let verdict = validate_shapefile_files(["parcel/PARCEL.SHP", "parcel/parcel.shx", "parcel/parcel.dbf"]);
/// assert!(verdict.accepted);
/// ```
#[must_use]
pub fn validate_shapefile_files<I, P>(files: I) -> ShapefileVerdict
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let present: BTreeSet<String> = files
        .into_iter()
        .filter_map(|file| dotted_extension(file.as_ref()))
        .collect();
    decide(&present)
}

fn normalise_extension(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{lowered}")
    }
}

fn decide(present: &BTreeSet<String>) -> ShapefileVerdict {
    let has = |extension: &str| present.contains(extension);
    let present_core_extensions = filter_present(&SHAPEFILE_CORE, present);
    let present_auxiliary_extensions = filter_present(&SHAPEFILE_AUXILIARY, present);

    let has_shp = has(".shp");
    let has_shx = has(".shx");
    let has_dbf = has(".dbf");
    let has_aux = !present_auxiliary_extensions.is_empty();

    let error_kind = match (has_shp, has_shx, has_dbf, has_aux) {
        (true, true, true, _) | (false, false, false, false) => None,
        (false, false, false, true) => Some(ShapefileErrorKind::AuxWithoutCore),
        (false, _, _, _) => Some(ShapefileErrorKind::ShxOrDbfWithoutShp),
        (true, false, false, true) => Some(ShapefileErrorKind::IncompleteShapefileWithAuxiliary),
        (true, false, false, false) => Some(ShapefileErrorKind::IncompleteShapefile),
        (true, false, true, _) => Some(ShapefileErrorKind::MissingShx),
        (true, true, false, _) => Some(ShapefileErrorKind::MissingDbf),
    };

    let missing_files = if error_kind.is_some() {
        SHAPEFILE_CORE
            .iter()
            .filter(|extension| !present.contains(**extension))
            .map(|extension| (*extension).to_owned())
            .collect()
    } else {
        Vec::new()
    };

    ShapefileVerdict {
        accepted: error_kind.is_none(),
        present_core_extensions,
        present_auxiliary_extensions,
        error_kind,
        missing_files,
    }
}

fn filter_present(candidates: &[&str], present: &BTreeSet<String>) -> Vec<String> {
    candidates
        .iter()
        .filter(|extension| present.contains(**extension))
        .map(|extension| (*extension).to_owned())
        .collect()
}
