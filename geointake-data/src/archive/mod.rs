//! Archive extraction with an ordered strategy chain.
//!
//! Strategies run in order until one produces at least one file. The
//! destination must be missing or empty; whatever a failed attempt wrote is
//! cleared before the next one runs. Entry names are pre-scanned and the
//! extracted tree is checked for containment afterwards. Traversal is never
//! retried: a hostile archive fails immediately.

mod error;
mod rar_listing;
mod strategy;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use camino::Utf8PathBuf;
use geointake_core::{ArchiveKind, FileFormat};
use geointake_fs::{
    ContainmentError, clear_dir, ensure_dir_empty, list_relative_files, utf8_path,
    verify_contained,
};
use log::{debug, info, warn};
use serde::Serialize;

use crate::blocking::run_blocking;
use crate::toolchain::ToolCapabilities;

pub use error::{ArchiveExtractionError, StrategyAttempt, StrategyError};
pub use strategy::{ExtractionStrategy, ExtractionStrategyKind, LibraryStrategy, NativeToolStrategy};

/// Successful extraction of one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    /// Directory the archive was extracted into.
    #[serde(skip)]
    pub destination: PathBuf,
    /// Extracted regular files relative to `destination`, `/`-separated and
    /// sorted.
    pub extracted_files: Vec<Utf8PathBuf>,
    /// Strategy that produced the files.
    pub strategy_used: ExtractionStrategyKind,
    /// Strategies that failed before the winning one.
    pub failed_attempts: Vec<StrategyAttempt>,
}

impl ExtractionReport {
    /// Absolute paths of the extracted files, in report order.
    pub fn absolute_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.extracted_files
            .iter()
            .map(|relative| self.destination.join(relative.as_std_path()))
    }
}

/// Extracts zip and rar archives through an ordered list of strategies.
///
/// # Examples
/// ```no_run
/// use std::{path::Path, sync::Arc};
/// use geointake_data::{ArchiveExtractor, ToolCapabilities, ToolSettings};
///
/// # async fn run() -> Result<(), geointake_data::ArchiveExtractionError> {
/// let capabilities = Arc::new(ToolCapabilities::probe(&ToolSettings::default()));
/// let extractor = ArchiveExtractor::new(capabilities);
/// let report = extractor
///     .extract(Path::new("parcels.zip"), Path::new("/tmp/parcels"))
///     .await?;
/// println!("{} files via {}", report.extracted_files.len(), report.strategy_used);
/// # Ok(())
/// # }
/// ```
pub struct ArchiveExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl std::fmt::Debug for ArchiveExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveExtractor")
            .field("strategies", &self.strategy_kinds().collect::<Vec<_>>())
            .finish()
    }
}

impl ArchiveExtractor {
    /// Native tool first, then the in-process library.
    #[must_use]
    pub fn new(capabilities: Arc<ToolCapabilities>) -> Self {
        Self::with_strategies(vec![
            Box::new(NativeToolStrategy::new(capabilities)),
            Box::new(LibraryStrategy),
        ])
    }

    /// Use an explicit strategy chain.
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategies in the order they are tried.
    pub fn strategy_kinds(&self) -> impl Iterator<Item = ExtractionStrategyKind> + '_ {
        self.strategies.iter().map(|strategy| strategy.kind())
    }

    /// Extract `archive` into `destination`, inferring the archive kind from
    /// its extension.
    ///
    /// # Errors
    /// See [`ArchiveExtractor::extract_kind`]; additionally returns
    /// [`ArchiveExtractionError::NotAnArchive`] for other extensions.
    pub async fn extract(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> Result<ExtractionReport, ArchiveExtractionError> {
        match FileFormat::classify(archive) {
            FileFormat::Archive(kind) => self.extract_kind(archive, kind, destination).await,
            FileFormat::GeoJson | FileFormat::ShapefileComponent | FileFormat::Unknown => {
                Err(ArchiveExtractionError::NotAnArchive {
                    path: archive.to_path_buf(),
                })
            }
        }
    }

    /// Extract an archive of a known kind into `destination`.
    ///
    /// The destination is created when missing and must otherwise be empty.
    /// Success always carries at least one file; on failure the destination
    /// is left empty.
    ///
    /// # Errors
    /// Returns [`ArchiveExtractionError::DestinationNotEmpty`] for a
    /// destination that already holds entries,
    /// [`ArchiveExtractionError::TraversalDetected`] as soon as any entry
    /// would land outside `destination`, and
    /// [`ArchiveExtractionError::AllStrategiesFailed`] when no strategy
    /// produced files.
    pub async fn extract_kind(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        destination: &Path,
    ) -> Result<ExtractionReport, ArchiveExtractionError> {
        let target = destination.to_path_buf();
        let empty = run_blocking(move || ensure_dir_empty(utf8_path(&target)?))
            .await
            .map_err(|source| ArchiveExtractionError::Destination {
                source,
                path: destination.to_path_buf(),
            })?;
        if !empty {
            return Err(ArchiveExtractionError::DestinationNotEmpty {
                path: destination.to_path_buf(),
            });
        }

        prescan(archive, kind).await?;

        let mut attempts = Vec::new();
        for strategy in &self.strategies {
            let strategy_kind = strategy.kind();
            debug!("extracting {} with {strategy_kind}", archive.display());
            let detail = match strategy.extract(archive, kind, destination).await {
                Ok(()) => match collect(archive, destination).await {
                    Ok(files) if files.is_empty() => "extraction produced no files".to_owned(),
                    Ok(files) => {
                        info!(
                            "extracted {} files from {} with {strategy_kind}",
                            files.len(),
                            archive.display()
                        );
                        return Ok(ExtractionReport {
                            destination: destination.to_path_buf(),
                            extracted_files: files,
                            strategy_used: strategy_kind,
                            failed_attempts: attempts,
                        });
                    }
                    Err(CollectError::Fatal(err)) => {
                        clear(destination).await?;
                        return Err(err);
                    }
                    Err(CollectError::Listing(detail)) => detail,
                },
                Err(StrategyError::TraversalDetected { entry }) => {
                    clear(destination).await?;
                    return Err(ArchiveExtractionError::TraversalDetected {
                        archive: archive.to_path_buf(),
                        entry,
                    });
                }
                Err(err) => err.to_string(),
            };
            warn!(
                "{strategy_kind} extraction of {} failed: {detail}",
                archive.display()
            );
            attempts.push(StrategyAttempt::new(strategy_kind, detail));
            clear(destination).await?;
        }

        Err(ArchiveExtractionError::AllStrategiesFailed {
            archive: archive.to_path_buf(),
            attempts,
        })
    }
}

/// Reject archives whose entry names escape before any strategy runs.
///
/// Archives that cannot be listed here still pass through the per-strategy
/// checks.
async fn prescan(archive: &Path, kind: ArchiveKind) -> Result<(), ArchiveExtractionError> {
    let owned = archive.to_path_buf();
    let scan = run_blocking(move || match kind {
        ArchiveKind::Zip => strategy::find_escaping_zip_entry(&owned),
        ArchiveKind::Rar => strategy::find_escaping_rar_entry(&owned),
    })
    .await;
    match scan {
        Ok(Some(entry)) => Err(ArchiveExtractionError::TraversalDetected {
            archive: archive.to_path_buf(),
            entry,
        }),
        Ok(None) => Ok(()),
        Err(err) => {
            warn!("could not pre-scan {}: {err}", archive.display());
            Ok(())
        }
    }
}

async fn clear(destination: &Path) -> Result<(), ArchiveExtractionError> {
    let owned = destination.to_path_buf();
    run_blocking(move || clear_dir(utf8_path(&owned)?))
        .await
        .map_err(|source| ArchiveExtractionError::Destination {
            source,
            path: destination.to_path_buf(),
        })
}

enum CollectError {
    Fatal(ArchiveExtractionError),
    Listing(String),
}

async fn collect(archive: &Path, destination: &Path) -> Result<Vec<Utf8PathBuf>, CollectError> {
    let archive = archive.to_path_buf();
    let root = destination.to_path_buf();
    tokio::task::spawn_blocking(move || collect_tree(&archive, &root))
        .await
        .map_err(|err| CollectError::Listing(format!("listing task failed: {err}")))?
}

fn collect_tree(archive: &Path, destination: &Path) -> Result<Vec<Utf8PathBuf>, CollectError> {
    match verify_contained(destination) {
        Ok(()) => {}
        Err(ContainmentError::Escape { entry, .. }) => {
            return Err(CollectError::Fatal(
                ArchiveExtractionError::TraversalDetected {
                    archive: archive.to_path_buf(),
                    entry: entry.display().to_string(),
                },
            ));
        }
        Err(err) => return Err(CollectError::Listing(err.to_string())),
    }
    list_relative_files(destination)
        .map_err(|err| CollectError::Listing(format!("failed to list extracted files: {err}")))
}
