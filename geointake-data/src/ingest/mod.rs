//! Request-level ingestion: classify, extract, validate and inspect.
//!
//! Every request runs inside its own [`ScratchWorkspace`]. Archives are
//! extracted concurrently into `archive-N` directories, standalone uploads
//! are copied into `uploads/` under their original names, and the workspace
//! is removed once the outcome has been assembled.

mod outcome;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use geointake_core::{FileFormat, UploadedFile, validate_shapefile_files};
use geointake_fs::{ScratchWorkspace, ensure_dir, utf8_path};
use log::{debug, info, warn};
use thiserror::Error;

use crate::archive::{ArchiveExtractionError, ArchiveExtractor, ExtractionReport};
use crate::blocking::run_blocking;
use crate::geospatial::GeospatialInfoExtractor;
use crate::toolchain::ToolCapabilities;

pub use outcome::{
    ArchiveSummary, ClassifiedFile, IngestionIssue, IngestionOutcome, IngestionStatus,
    IssueCategory,
};
use outcome::OutcomeDraft;

const UPLOADS_DIR: &str = "uploads";

/// Where request workspaces are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Parent directory of per-request workspaces.
    pub scratch_root: PathBuf,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
        }
    }
}

impl IngestSettings {
    /// Use `root` as the parent of request workspaces.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }
}

/// Infrastructure failures that prevent an outcome from being produced.
///
/// Problems with the uploads themselves are reported inside
/// [`IngestionOutcome`] instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The request workspace could not be created.
    #[error("failed to prepare workspace under {path:?}: {source}")]
    Workspace { source: io::Error, path: PathBuf },
    /// A standalone upload could not be copied into the workspace.
    #[error("failed to stage upload {name} from {path:?}: {source}")]
    Stage {
        source: io::Error,
        name: String,
        path: PathBuf,
    },
}

/// A file eligible for metadata extraction.
#[derive(Debug)]
struct Candidate {
    display_name: String,
    path: PathBuf,
}

impl Candidate {
    fn has_extension(&self, wanted: &str) -> bool {
        Path::new(&self.display_name)
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case(wanted))
    }
}

/// Pick the file metadata is extracted from: the first `.shp`, else the
/// first `.geojson`, else the first `.json`, else the first file.
fn select_primary(candidates: &[Candidate]) -> Option<&Candidate> {
    ["shp", "geojson", "json"]
        .into_iter()
        .find_map(|extension| {
            candidates
                .iter()
                .find(|candidate| candidate.has_extension(extension))
        })
        .or_else(|| candidates.first())
}

/// Drives one upload request from classification to metadata.
#[derive(Debug)]
pub struct IngestionOrchestrator {
    settings: IngestSettings,
    archives: ArchiveExtractor,
    geospatial: GeospatialInfoExtractor,
}

impl IngestionOrchestrator {
    /// Build an orchestrator with the default strategy chain.
    #[must_use]
    pub fn new(settings: IngestSettings, capabilities: Arc<ToolCapabilities>) -> Self {
        Self {
            settings,
            archives: ArchiveExtractor::new(Arc::clone(&capabilities)),
            geospatial: GeospatialInfoExtractor::new(capabilities),
        }
    }

    /// Build an orchestrator from preconfigured extractors.
    #[must_use]
    pub fn with_extractors(
        settings: IngestSettings,
        archives: ArchiveExtractor,
        geospatial: GeospatialInfoExtractor,
    ) -> Self {
        Self {
            settings,
            archives,
            geospatial,
        }
    }

    /// Process one request.
    ///
    /// Unsupported uploads are reported and skipped. The request is rejected
    /// when nothing is supported, when an archive cannot be extracted, or
    /// when a shapefile set is incomplete. Metadata failures leave the files
    /// accepted with status `metadata_incomplete`.
    ///
    /// # Errors
    /// Returns [`IngestError`] when the workspace cannot be prepared or an
    /// upload cannot be staged.
    pub async fn ingest(&self, files: &[UploadedFile]) -> Result<IngestionOutcome, IngestError> {
        let root = self.settings.scratch_root.clone();
        let workspace = run_blocking(move || ScratchWorkspace::create_in(&root))
            .await
            .map_err(|source| IngestError::Workspace {
                source,
                path: self.settings.scratch_root.clone(),
            })?;
        debug!("ingesting {} uploads in {}", files.len(), workspace.path().display());

        let result = self.ingest_in(files, &workspace).await;

        let location = workspace.path().to_path_buf();
        if let Err(err) = run_blocking(move || workspace.close()).await {
            warn!("failed to remove workspace {}: {err}", location.display());
        }

        let outcome = result?;
        info!(
            "ingested {} uploads: {} ({} issues)",
            files.len(),
            outcome.status.as_str(),
            outcome.errors.len()
        );
        Ok(outcome)
    }

    async fn ingest_in(
        &self,
        files: &[UploadedFile],
        workspace: &ScratchWorkspace,
    ) -> Result<IngestionOutcome, IngestError> {
        let mut draft = OutcomeDraft::default();
        let mut accepted = Vec::new();
        for file in files {
            let format = file.format();
            draft.files.push(ClassifiedFile::new(file, format));
            if format == FileFormat::Unknown {
                warn!("skipping unsupported upload {}", file.original_name);
                draft
                    .errors
                    .push(IngestionIssue::unsupported_file(&file.original_name));
            } else {
                debug!("classified {} as {format:?}", file.original_name);
                accepted.push((file, format));
            }
        }
        if accepted.is_empty() {
            return Ok(draft.reject(IngestionIssue::no_supported_files()));
        }

        let extractions = join_all(accepted.iter().enumerate().map(
            |(position, (file, format))| self.extract_archive(position, file, *format, workspace),
        ))
        .await;

        let mut candidates = Vec::new();
        let mut standalone = Vec::new();
        let mut staged_names = HashSet::new();
        let uploads_dir = workspace.path().join(UPLOADS_DIR);
        let target = uploads_dir.clone();
        run_blocking(move || ensure_dir(utf8_path(&target)?).map(drop))
            .await
            .map_err(|source| IngestError::Workspace {
                source,
                path: uploads_dir.clone(),
            })?;
        for ((file, _), extraction) in accepted.iter().zip(extractions) {
            match extraction {
                Some(Ok(report)) => {
                    let verdict = validate_shapefile_files(&report.extracted_files);
                    if let Err(err) = verdict.clone().into_result() {
                        warn!("{} holds an incomplete shapefile: {err}", file.original_name);
                        return Ok(draft.reject(IngestionIssue::incomplete_shapefile(
                            Some(&file.original_name),
                            &err,
                        )));
                    }
                    candidates.extend(archive_candidates(&file.original_name, &report));
                    draft.archives.push(ArchiveSummary {
                        name: file.original_name.clone(),
                        extraction: report,
                        shapefile: verdict,
                    });
                }
                Some(Err(err)) => {
                    warn!("rejecting {}: {err}", file.original_name);
                    return Ok(draft.reject(IngestionIssue::extraction(&file.original_name, &err)));
                }
                None => {
                    standalone.push(file.original_name.as_str());
                    if let Some(candidate) =
                        stage_upload(file, &uploads_dir, &mut staged_names).await?
                    {
                        candidates.push(candidate);
                    }
                }
            }
        }

        if !standalone.is_empty()
            && let Err(err) = validate_shapefile_files(&standalone).into_result()
        {
            warn!("standalone uploads hold an incomplete shapefile: {err}");
            return Ok(draft.reject(IngestionIssue::incomplete_shapefile(None, &err)));
        }

        let Some(primary) = select_primary(&candidates) else {
            return Ok(draft.reject(IngestionIssue::no_supported_files()));
        };
        debug!("extracting metadata from {}", primary.display_name);
        match self.geospatial.extract(&primary.path).await {
            Ok(info) => Ok(draft.complete(info, primary.display_name.clone())),
            Err(err) => {
                warn!("metadata unavailable for {}: {err}", primary.display_name);
                let issue = IngestionIssue::geospatial(&primary.display_name, &err);
                Ok(draft.incomplete(issue, primary.display_name.clone()))
            }
        }
    }

    /// Extract `file` into `archive-N` when it is an archive; `None` for
    /// standalone uploads.
    async fn extract_archive(
        &self,
        position: usize,
        file: &UploadedFile,
        format: FileFormat,
        workspace: &ScratchWorkspace,
    ) -> Option<Result<ExtractionReport, ArchiveExtractionError>> {
        let FileFormat::Archive(kind) = format else {
            return None;
        };
        let destination = workspace.path().join(format!("archive-{position}"));
        Some(
            self.archives
                .extract_kind(file.path(), kind, &destination)
                .await,
        )
    }
}

fn archive_candidates(archive: &str, report: &ExtractionReport) -> Vec<Candidate> {
    report
        .extracted_files
        .iter()
        .zip(report.absolute_paths())
        .map(|(relative, path)| Candidate {
            display_name: format!("{archive}/{relative}"),
            path,
        })
        .collect()
}

/// Copy a standalone upload into `dir` under its original file name so
/// shapefile siblings sit next to each other.
async fn stage_upload(
    file: &UploadedFile,
    dir: &Path,
    staged_names: &mut HashSet<String>,
) -> Result<Option<Candidate>, IngestError> {
    let normalised = file.original_name.replace('\\', "/");
    let Some(name) = Path::new(&normalised)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
    else {
        warn!("cannot stage upload with name {:?}", file.original_name);
        return Ok(None);
    };
    if !staged_names.insert(name.to_ascii_lowercase()) {
        warn!("skipping duplicate upload name {}", file.original_name);
        return Ok(None);
    }
    let target = dir.join(&name);
    tokio::fs::copy(file.path(), &target)
        .await
        .map_err(|source| IngestError::Stage {
            source,
            name: file.original_name.clone(),
            path: file.stored_path.clone(),
        })?;
    Ok(Some(Candidate {
        display_name: file.original_name.clone(),
        path: target,
    }))
}
