//! Files handed to the pipeline by the caller.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::format::FileFormat;

/// A file the caller has already stored on disk.
///
/// The pipeline only reads from [`UploadedFile::stored_path`]; the original
/// name drives classification because stored names are often opaque.
///
/// # Examples
/// ```
/// use geointake_core::{FileFormat, UploadedFile};
///
/// let file = UploadedFile::new("Parcel.SHP", "/srv/uploads/3f9a", 1024)
///     .with_mime_type("application/octet-stream");
/// assert_eq!(file.format(), FileFormat::ShapefileComponent);
/// assert_eq!(file.declared_mime_type.as_deref(), Some("application/octet-stream"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Name the user uploaded the file under.
    pub original_name: String,
    /// Location of the stored bytes.
    pub stored_path: PathBuf,
    /// Size reported by the upload layer.
    pub size_bytes: u64,
    /// MIME type declared by the client, if any.
    pub declared_mime_type: Option<String>,
}

impl UploadedFile {
    /// Describe a stored upload.
    pub fn new(
        original_name: impl Into<String>,
        stored_path: impl Into<PathBuf>,
        size_bytes: u64,
    ) -> Self {
        Self {
            original_name: original_name.into(),
            stored_path: stored_path.into(),
            size_bytes,
            declared_mime_type: None,
        }
    }

    /// Attach the MIME type declared by the client.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.declared_mime_type = Some(mime_type.into());
        self
    }

    /// Classify the upload by its original name.
    #[must_use]
    pub fn format(&self) -> FileFormat {
        FileFormat::classify(&self.original_name)
    }

    /// Path of the stored bytes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.stored_path
    }
}
