//! Command-line interface for inspecting geospatial uploads.
#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::io::Write;

use clap::{Parser, Subcommand};

mod error;
mod inspect;

pub use error::CliError;

use inspect::InspectArgs;

pub(crate) const ARG_INSPECT_FILE: &str = "file";
pub(crate) const ARG_INSPECT_OGRINFO: &str = "ogrinfo";
pub(crate) const ARG_INSPECT_UNZIP: &str = "unzip";
pub(crate) const ARG_INSPECT_UNRAR: &str = "unrar";
pub(crate) const ARG_INSPECT_TIMEOUT_SECS: &str = "timeout-secs";
pub(crate) const ARG_INSPECT_MAX_OUTPUT_BYTES: &str = "max-output-bytes";
pub(crate) const ARG_INSPECT_SCRATCH_DIR: &str = "scratch-dir";
pub(crate) const ENV_INSPECT_FILES: &str = "GEOINTAKE_CMDS_INSPECT_FILES";

/// Run the geointake CLI with the current process arguments, printing to
/// stdout.
pub fn run() -> Result<(), CliError> {
    let stdout = std::io::stdout();
    run_with_args(std::env::args_os(), &mut stdout.lock())
}

/// Run the CLI with explicit arguments, writing command output to `writer`.
pub fn run_with_args<I, T, W>(args: I, writer: &mut W) -> Result<(), CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    let cli = Cli::try_parse_from(args).map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Inspect(args) => run_inspect(args, writer),
    }
}

fn run_inspect<W: Write>(args: InspectArgs, writer: &mut W) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let outcome = runtime.block_on(inspect::inspect(&config))?;
    inspect::write_outcome(writer, &outcome)
}

#[derive(Debug, Parser)]
#[command(
    name = "geointake",
    about = "Ingestion utilities for geospatial uploads",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest local files as one upload request and print the outcome.
    Inspect(InspectArgs),
}

#[cfg(test)]
mod tests;
