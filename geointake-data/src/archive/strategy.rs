use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{MAIN_SEPARATOR_STR, Path};
use std::sync::Arc;

use async_trait::async_trait;
use geointake_core::ArchiveKind;
use geointake_fs::{contained_entry_path, ensure_dir, open_utf8_file, utf8_path};
use serde::Serialize;

use crate::toolchain::{ToolCapabilities, ToolCommand, run_tool};

use super::{StrategyError, rar_listing};

/// Identifies an extraction strategy in reports and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategyKind {
    /// A command-line extractor such as `unzip` or `unrar`.
    NativeTool,
    /// An in-process archive library.
    Library,
}

impl ExtractionStrategyKind {
    /// Return the identifier used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NativeTool => "native_tool",
            Self::Library => "library",
        }
    }
}

impl fmt::Display for ExtractionStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of unpacking an archive into a directory.
///
/// Implementations write into `destination`, which exists and is empty
/// when they are called. Listing and containment checks happen afterwards
/// in [`super::ArchiveExtractor`].
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Strategy identifier.
    fn kind(&self) -> ExtractionStrategyKind;

    /// Unpack `archive` into `destination`.
    async fn extract(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        destination: &Path,
    ) -> Result<(), StrategyError>;
}

/// Runs `unzip` or `unrar` under the configured limits.
#[derive(Debug, Clone)]
pub struct NativeToolStrategy {
    capabilities: Arc<ToolCapabilities>,
}

impl NativeToolStrategy {
    /// Use the tools recorded in `capabilities`.
    #[must_use]
    pub fn new(capabilities: Arc<ToolCapabilities>) -> Self {
        Self { capabilities }
    }
}

#[async_trait]
impl ExtractionStrategy for NativeToolStrategy {
    fn kind(&self) -> ExtractionStrategyKind {
        ExtractionStrategyKind::NativeTool
    }

    async fn extract(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        destination: &Path,
    ) -> Result<(), StrategyError> {
        let (tool, command) = match kind {
            ArchiveKind::Zip => ("unzip", self.capabilities.unzip.as_ref()),
            ArchiveKind::Rar => ("unrar", self.capabilities.unrar.as_ref()),
        };
        let command = command.ok_or_else(|| StrategyError::ToolUnavailable {
            tool: tool.to_owned(),
        })?;
        let args: Vec<OsString> = match kind {
            ArchiveKind::Zip => vec![
                "-o".into(),
                "-qq".into(),
                archive.into(),
                "-d".into(),
                destination.into(),
            ],
            ArchiveKind::Rar => {
                self.check_rar_listing(command, archive).await?;
                let mut target = OsString::from(destination);
                target.push(MAIN_SEPARATOR_STR);
                vec![
                    "x".into(),
                    "-o+".into(),
                    "-idq".into(),
                    archive.into(),
                    target,
                ]
            }
        };
        run_tool(command, args, &self.capabilities.limits)
            .await?
            .into_success(command.name())?;
        Ok(())
    }
}

impl NativeToolStrategy {
    /// List the archive with `unrar lb` and refuse escaping entry names.
    async fn check_rar_listing(
        &self,
        command: &ToolCommand,
        archive: &Path,
    ) -> Result<(), StrategyError> {
        let args = [OsStr::new("lb"), OsStr::new("-idq"), archive.as_os_str()];
        let listing = run_tool(command, args, &self.capabilities.limits)
            .await?
            .into_success(command.name())?;
        let names = String::from_utf8_lossy(&listing.stdout);
        match first_escaping_name(names.lines()) {
            Some(entry) => Err(StrategyError::TraversalDetected { entry }),
            None => Ok(()),
        }
    }
}

/// Extracts in process with the `zip` and `rar` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryStrategy;

#[async_trait]
impl ExtractionStrategy for LibraryStrategy {
    fn kind(&self) -> ExtractionStrategyKind {
        ExtractionStrategyKind::Library
    }

    async fn extract(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        destination: &Path,
    ) -> Result<(), StrategyError> {
        let archive = archive.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || match kind {
            ArchiveKind::Zip => unpack_zip(&archive, &destination),
            ArchiveKind::Rar => unpack_rar(&archive, &destination),
        })
        .await
        .map_err(|source| StrategyError::Task { source })?
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StrategyError + '_ {
    move |source| StrategyError::Io {
        source,
        path: path.to_path_buf(),
    }
}

fn unpack_zip(archive: &Path, destination: &Path) -> Result<(), StrategyError> {
    let file = open_utf8_file(utf8_path(archive).map_err(io_error(archive))?)
        .map_err(io_error(archive))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|err| StrategyError::Archive {
        message: err.to_string(),
    })?;
    let root = ensure_dir(utf8_path(destination).map_err(io_error(destination))?)
        .map_err(io_error(destination))?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|err| StrategyError::Archive {
            message: err.to_string(),
        })?;
        let name = entry.name().to_owned();
        let relative = entry
            .enclosed_name()
            .and_then(|_| contained_entry_path(&name))
            .ok_or_else(|| StrategyError::TraversalDetected {
                entry: name.clone(),
            })?;
        if relative.as_str().is_empty() {
            continue;
        }
        let target = destination.join(relative.as_std_path());
        if entry.is_dir() {
            root.create_dir_all(&relative).map_err(io_error(&target))?;
            continue;
        }
        if let Some(parent) = relative.parent()
            && !parent.as_str().is_empty()
        {
            root.create_dir_all(parent).map_err(io_error(&target))?;
        }
        let mut output = root.create(&relative).map_err(io_error(&target))?;
        io::copy(&mut entry, &mut output).map_err(io_error(&target))?;
    }
    Ok(())
}

fn unpack_rar(archive: &Path, destination: &Path) -> Result<(), StrategyError> {
    let names = rar_listing::entry_names(archive).map_err(|err| StrategyError::Archive {
        message: format!("cannot list entries: {err}"),
    })?;
    if let Some(entry) = first_escaping_name(names.iter().map(String::as_str)) {
        return Err(StrategyError::TraversalDetected { entry });
    }
    let archive_str = utf8_path(archive).map_err(io_error(archive))?;
    let destination_str = utf8_path(destination).map_err(io_error(destination))?;
    rar::Archive::extract_all(archive_str.as_str(), destination_str.as_str(), "")
        .map(drop)
        .map_err(|err| StrategyError::Archive {
            message: format!("{err:?}"),
        })
}

/// First entry name that would resolve outside the extraction root.
pub(super) fn first_escaping_name<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    names
        .into_iter()
        .find(|name| contained_entry_path(name).is_none())
        .map(str::to_owned)
}

/// First zip entry whose name escapes the extraction root, if any.
///
/// Archives that cannot be opened yield `Ok(None)`; the strategies report
/// those failures with more context.
pub(super) fn find_escaping_zip_entry(archive: &Path) -> io::Result<Option<String>> {
    let file = open_utf8_file(utf8_path(archive)?)?;
    let Ok(zip) = zip::ZipArchive::new(file) else {
        return Ok(None);
    };
    Ok(first_escaping_name(zip.file_names()))
}

/// First rar entry whose name escapes the extraction root, if any.
pub(super) fn find_escaping_rar_entry(archive: &Path) -> io::Result<Option<String>> {
    let names = rar_listing::entry_names(archive)?;
    Ok(first_escaping_name(names.iter().map(String::as_str)))
}
