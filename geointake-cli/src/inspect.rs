//! Inspect command implementation for the geointake CLI.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use geointake_core::UploadedFile;
use geointake_data::{
    IngestSettings, IngestionOrchestrator, IngestionOutcome, ToolCapabilities, ToolSettings,
};
use geointake_fs::open_utf8_file;
use log::debug;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_INSPECT_FILE, ARG_INSPECT_MAX_OUTPUT_BYTES, ARG_INSPECT_OGRINFO, ARG_INSPECT_SCRATCH_DIR,
    ARG_INSPECT_TIMEOUT_SECS, ARG_INSPECT_UNRAR, ARG_INSPECT_UNZIP, CliError, ENV_INSPECT_FILES,
};

/// CLI arguments for the `inspect` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Run the upload ingestion pipeline over local files and \
                 print the outcome as JSON. Archives are extracted into a \
                 scratch workspace that is removed afterwards; tool names \
                 and limits can come from CLI flags, configuration files, or \
                 environment variables.",
    about = "Classify, extract and summarise geospatial uploads"
)]
#[ortho_config(prefix = "GEOINTAKE")]
pub(crate) struct InspectArgs {
    /// Files to ingest as one upload request.
    #[arg(value_name = ARG_INSPECT_FILE)]
    #[serde(default)]
    pub(crate) files: Vec<Utf8PathBuf>,
    /// Program used to read shapefiles (GDAL's `ogrinfo`).
    #[arg(long = ARG_INSPECT_OGRINFO, value_name = "program")]
    #[serde(default)]
    pub(crate) ogrinfo: Option<String>,
    /// Program used to extract zip archives.
    #[arg(long = ARG_INSPECT_UNZIP, value_name = "program")]
    #[serde(default)]
    pub(crate) unzip: Option<String>,
    /// Program used to extract rar archives.
    #[arg(long = ARG_INSPECT_UNRAR, value_name = "program")]
    #[serde(default)]
    pub(crate) unrar: Option<String>,
    /// Wall-clock limit for each external tool run, in seconds.
    #[arg(long = ARG_INSPECT_TIMEOUT_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) timeout_secs: Option<u64>,
    /// Cap on the bytes read from each tool output stream.
    #[arg(long = ARG_INSPECT_MAX_OUTPUT_BYTES, value_name = "bytes")]
    #[serde(default)]
    pub(crate) max_output_bytes: Option<usize>,
    /// Directory below which request workspaces are created.
    #[arg(long = ARG_INSPECT_SCRATCH_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) scratch_dir: Option<Utf8PathBuf>,
}

impl InspectArgs {
    pub(crate) fn into_config(self) -> Result<InspectConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        InspectConfig::try_from(merged)
    }
}

/// Resolved `inspect` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InspectConfig {
    /// Uploads, in request order.
    pub(crate) files: Vec<Utf8PathBuf>,
    /// External tool names and limits.
    pub(crate) tools: ToolSettings,
    /// Workspace placement.
    pub(crate) ingest: IngestSettings,
}

impl InspectConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        for file in &self.files {
            Self::require_existing(file, ARG_INSPECT_FILE)?;
        }
        Ok(())
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match geointake_fs::file_is_file(path) {
            Ok(true) => Ok(()),
            Ok(false) => match path.try_exists() {
                Ok(true) => Err(CliError::SourcePathNotFile {
                    field,
                    path: path.to_path_buf(),
                }),
                Ok(false) => Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                }),
                Err(source) => Err(CliError::InspectSourcePath {
                    field,
                    path: path.to_path_buf(),
                    source,
                }),
            },
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Describe each input as an upload named after its file name.
    pub(crate) fn uploads(&self) -> Result<Vec<UploadedFile>, CliError> {
        self.files
            .iter()
            .map(|path| {
                let inspect_error = |source: std::io::Error| CliError::InspectSourcePath {
                    field: ARG_INSPECT_FILE,
                    path: path.clone(),
                    source,
                };
                let size = open_utf8_file(path)
                    .and_then(|file| file.metadata())
                    .map_err(inspect_error)?
                    .len();
                let name = path.file_name().unwrap_or(path.as_str());
                Ok(UploadedFile::new(name, path.as_std_path(), size))
            })
            .collect()
    }
}

impl TryFrom<InspectArgs> for InspectConfig {
    type Error = CliError;

    fn try_from(args: InspectArgs) -> Result<Self, Self::Error> {
        if args.files.is_empty() {
            return Err(CliError::MissingArgument {
                field: ARG_INSPECT_FILE,
                env: ENV_INSPECT_FILES,
            });
        }

        let mut tools = ToolSettings::default();
        if let Some(program) = args.ogrinfo {
            tools = tools.with_ogrinfo(program);
        }
        if let Some(program) = args.unzip {
            tools = tools.with_unzip(program);
        }
        if let Some(program) = args.unrar {
            tools = tools.with_unrar(program);
        }
        match args.timeout_secs {
            Some(0) => {
                return Err(CliError::InvalidArgument {
                    field: ARG_INSPECT_TIMEOUT_SECS,
                    reason: "must be at least one second",
                });
            }
            Some(secs) => tools = tools.with_timeout(Duration::from_secs(secs)),
            None => {}
        }
        match args.max_output_bytes {
            Some(0) => {
                return Err(CliError::InvalidArgument {
                    field: ARG_INSPECT_MAX_OUTPUT_BYTES,
                    reason: "must be greater than zero",
                });
            }
            Some(limit) => tools = tools.with_output_limit(limit),
            None => {}
        }

        let mut ingest = IngestSettings::default();
        if let Some(dir) = args.scratch_dir {
            ingest = ingest.with_scratch_root(dir.into_std_path_buf());
        }

        Ok(Self {
            files: args.files,
            tools,
            ingest,
        })
    }
}

/// Probe the tools and ingest the configured files as one request.
pub(crate) async fn inspect(config: &InspectConfig) -> Result<IngestionOutcome, CliError> {
    let capabilities = Arc::new(ToolCapabilities::probe(&config.tools));
    debug!("tool capabilities: {capabilities:?}");
    let uploads = config.uploads()?;
    let orchestrator = IngestionOrchestrator::new(config.ingest.clone(), capabilities);
    Ok(orchestrator.ingest(&uploads).await?)
}

/// Print the outcome as pretty JSON followed by a newline.
pub(crate) fn write_outcome<W: Write>(
    writer: &mut W,
    outcome: &IngestionOutcome,
) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *writer, outcome).map_err(CliError::SerializeOutcome)?;
    writeln!(writer).map_err(CliError::WriteOutput)?;
    writer.flush().map_err(CliError::WriteOutput)
}
