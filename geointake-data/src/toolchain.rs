//! External command-line tools: settings, the start-up capability probe and
//! a bounded subprocess runner.
//!
//! Capabilities are resolved once and shared read-only through an `Arc`.
//! Every invocation runs under a wall-clock timeout and an output cap; a
//! process that overruns either is killed.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::debug;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

/// Wall-clock limit applied to every external tool.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest stdout or stderr capture accepted from a tool, in bytes.
pub const DEFAULT_OUTPUT_LIMIT: usize = 10 * 1024 * 1024;

/// Resource limits for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolLimits {
    /// Wall-clock timeout after which the process is killed.
    pub timeout: Duration,
    /// Maximum bytes captured from each output stream.
    pub output_limit: usize,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }
}

/// Program names and limits used when probing for external tools.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use geointake_data::ToolSettings;
///
/// let settings = ToolSettings::default()
///     .with_ogrinfo("/opt/gdal/bin/ogrinfo")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(settings.ogrinfo, "/opt/gdal/bin/ogrinfo");
/// assert_eq!(settings.limits.timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    /// Geometry introspection tool from GDAL.
    pub ogrinfo: String,
    /// Native zip extractor.
    pub unzip: String,
    /// Native rar extractor.
    pub unrar: String,
    /// Limits applied to every invocation.
    pub limits: ToolLimits,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ogrinfo: "ogrinfo".to_owned(),
            unzip: "unzip".to_owned(),
            unrar: "unrar".to_owned(),
            limits: ToolLimits::default(),
        }
    }
}

impl ToolSettings {
    /// Override the `ogrinfo` program name or path.
    #[must_use]
    pub fn with_ogrinfo(mut self, program: impl Into<String>) -> Self {
        self.ogrinfo = program.into();
        self
    }

    /// Override the `unzip` program name or path.
    #[must_use]
    pub fn with_unzip(mut self, program: impl Into<String>) -> Self {
        self.unzip = program.into();
        self
    }

    /// Override the `unrar` program name or path.
    #[must_use]
    pub fn with_unrar(mut self, program: impl Into<String>) -> Self {
        self.unrar = program.into();
        self
    }

    /// Override the per-invocation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    /// Override the per-stream output cap.
    #[must_use]
    pub fn with_output_limit(mut self, output_limit: usize) -> Self {
        self.limits.output_limit = output_limit;
        self
    }
}

/// A resolved tool: a display name plus the program and any leading
/// arguments needed to run it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    name: String,
    program: PathBuf,
    prefix_args: Vec<OsString>,
}

impl ToolCommand {
    /// Describe a tool run directly as `program`.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    /// Append an argument passed before the invocation-specific ones, for
    /// example a script run through an interpreter.
    #[must_use]
    pub fn with_prefix_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.prefix_args.push(arg.into());
        self
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Program that is executed.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Tools found at start-up, together with the limits they run under.
///
/// Built once by [`ToolCapabilities::probe`] and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCapabilities {
    /// Resolved `ogrinfo`, when installed.
    pub ogrinfo: Option<ToolCommand>,
    /// Resolved `unzip`, when installed.
    pub unzip: Option<ToolCommand>,
    /// Resolved `unrar`, when installed.
    pub unrar: Option<ToolCommand>,
    /// Limits applied to every invocation.
    pub limits: ToolLimits,
}

impl ToolCapabilities {
    /// Resolve every configured program on `PATH`.
    #[must_use]
    pub fn probe(settings: &ToolSettings) -> Self {
        Self {
            ogrinfo: resolve("ogrinfo", &settings.ogrinfo),
            unzip: resolve("unzip", &settings.unzip),
            unrar: resolve("unrar", &settings.unrar),
            limits: settings.limits,
        }
    }

    /// Capabilities with no external tools, forcing library fallbacks.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Replace the `ogrinfo` command.
    #[must_use]
    pub fn with_ogrinfo(mut self, command: ToolCommand) -> Self {
        self.ogrinfo = Some(command);
        self
    }

    /// Replace the `unzip` command.
    #[must_use]
    pub fn with_unzip(mut self, command: ToolCommand) -> Self {
        self.unzip = Some(command);
        self
    }

    /// Replace the `unrar` command.
    #[must_use]
    pub fn with_unrar(mut self, command: ToolCommand) -> Self {
        self.unrar = Some(command);
        self
    }

    /// Replace the invocation limits.
    #[must_use]
    pub fn with_limits(mut self, limits: ToolLimits) -> Self {
        self.limits = limits;
        self
    }
}

fn resolve(name: &str, program: &str) -> Option<ToolCommand> {
    match which::which(program) {
        Ok(path) => {
            debug!("found {name} at {}", path.display());
            Some(ToolCommand::new(name, path))
        }
        Err(err) => {
            debug!("{name} not available as {program:?}: {err}");
            None
        }
    }
}

/// Errors raised while running an external tool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The process could not be started.
    #[error("failed to launch {tool}: {source}")]
    Spawn { tool: String, source: io::Error },
    /// The process outlived its timeout and was killed.
    #[error("{tool} timed out after {}s", .timeout.as_secs_f32())]
    Timeout { tool: String, timeout: Duration },
    /// An output stream exceeded the cap.
    #[error("{tool} produced more than {limit} bytes of output")]
    OutputTooLarge { tool: String, limit: usize },
    /// The process exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    /// Reading output or waiting for the process failed.
    #[error("failed to collect output from {tool}: {source}")]
    Io { tool: String, source: io::Error },
}

/// Captured result of a tool invocation that finished in time.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Standard error as trimmed text.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }

    /// Turn a non-zero exit into [`ToolError::Failed`].
    pub fn into_success(self, tool: &str) -> Result<Self, ToolError> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(ToolError::Failed {
                tool: tool.to_owned(),
                status: self.status,
                stderr: self.stderr_text(),
            })
        }
    }
}

enum Capture {
    Io(io::Error),
    TooLarge,
}

/// Run `command` with `args`, enforcing `limits`.
///
/// Stdin is closed. A non-zero exit is returned as output rather than an
/// error so callers can decide how much of the report to trust.
///
/// # Errors
/// Returns [`ToolError`] when the process cannot start, overruns its
/// timeout or output cap, or its output cannot be read.
pub async fn run_tool<I, S>(
    command: &ToolCommand,
    args: I,
    limits: &ToolLimits,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = command.name();
    let mut child = Command::new(&command.program)
        .args(&command.prefix_args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_owned(),
            source,
        })?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(ToolError::Io {
            tool: tool.to_owned(),
            source: io::Error::other("child output pipes were not captured"),
        });
    };

    let limit = limits.output_limit;
    let collect = async {
        let (stdout, stderr) =
            tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit))?;
        let status = child.wait().await.map_err(Capture::Io)?;
        Ok::<_, Capture>(ToolOutput {
            status,
            stdout,
            stderr,
        })
    };
    let finished = timeout(limits.timeout, collect).await;

    match finished {
        Ok(Ok(output)) => {
            debug!("{tool} exited with {}", output.status);
            Ok(output)
        }
        Ok(Err(Capture::TooLarge)) => {
            terminate(&mut child, tool).await;
            Err(ToolError::OutputTooLarge {
                tool: tool.to_owned(),
                limit,
            })
        }
        Ok(Err(Capture::Io(source))) => {
            terminate(&mut child, tool).await;
            Err(ToolError::Io {
                tool: tool.to_owned(),
                source,
            })
        }
        Err(_) => {
            terminate(&mut child, tool).await;
            Err(ToolError::Timeout {
                tool: tool.to_owned(),
                timeout: limits.timeout,
            })
        }
    }
}

async fn read_capped<R>(reader: R, limit: usize) -> Result<Vec<u8>, Capture>
where
    R: AsyncRead + Unpin,
{
    let budget = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut buffer = Vec::new();
    reader
        .take(budget)
        .read_to_end(&mut buffer)
        .await
        .map_err(Capture::Io)?;
    if buffer.len() > limit {
        return Err(Capture::TooLarge);
    }
    Ok(buffer)
}

async fn terminate(child: &mut tokio::process::Child, tool: &str) {
    if let Err(err) = child.kill().await {
        debug!("failed to kill {tool}: {err}");
    }
}
