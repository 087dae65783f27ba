// ── Scanner boundary ──
//
// A scanner writes the IP-quality CSV artifact and reports how much it
// kept. Three backends: the built-in TCP prober, an external program,
// and "none", which reuses whatever artifact is already on disk.

pub mod artifact;
pub mod ranges;
pub mod tcping;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ScanBackend, ScanCommand, ScanSettings};
use crate::error::CoreError;

pub use artifact::{
    HEADER_SENTINEL, parse_ip_records, read_ip_records, render_ip_records, write_ip_records,
};
pub use ranges::{candidates, parse_ranges};
pub use tcping::TcpPingScanner;

/// Placeholder in external scanner arguments replaced by the artifact path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Candidates probed, when the backend knows.
    pub probed: Option<usize>,
    /// Records in the written artifact.
    pub kept: usize,
    pub output: PathBuf,
}

/// Produces the IP-quality artifact at `output`.
pub trait Scanner: Send + Sync {
    fn scan(&self, output: &Path) -> impl Future<Output = Result<ScanSummary, CoreError>> + Send;
}

// ── External program ─────────────────────────────────────────────────

/// Runs an external scanner and then reads back the artifact it wrote.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    command: ScanCommand,
}

impl CommandScanner {
    pub fn new(command: ScanCommand) -> Self {
        Self { command }
    }

    /// Arguments with the output placeholder substituted.
    pub fn args_for(&self, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        self.command
            .args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }
}

impl Scanner for CommandScanner {
    async fn scan(&self, output: &Path) -> Result<ScanSummary, CoreError> {
        let program = &self.command.program;
        let args = self.args_for(output);
        debug!(%program, ?args, "spawning external scanner");

        let status = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| CoreError::Scanner {
                message: format!("cannot start `{program}`: {e}"),
            })?;

        if !status.success() {
            return Err(CoreError::Scanner {
                message: format!("`{program}` exited with {status}"),
            });
        }

        let records = read_ip_records(output).await?;
        info!(%program, kept = records.len(), "external scan finished");
        Ok(ScanSummary {
            probed: None,
            kept: records.len(),
            output: output.to_path_buf(),
        })
    }
}

// ── Existing artifact ────────────────────────────────────────────────

/// Skips scanning; the artifact must already exist and parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingArtifact;

impl Scanner for ExistingArtifact {
    async fn scan(&self, output: &Path) -> Result<ScanSummary, CoreError> {
        let records = read_ip_records(output).await?;
        debug!(path = %output.display(), kept = records.len(), "reusing scan artifact");
        Ok(ScanSummary {
            probed: None,
            kept: records.len(),
            output: output.to_path_buf(),
        })
    }
}

// ── Backend selection ────────────────────────────────────────────────

/// The scanner chosen by [`ScanSettings::backend`].
#[derive(Debug, Clone)]
pub enum ScannerBackend {
    Tcping(TcpPingScanner),
    Command(CommandScanner),
    Existing(ExistingArtifact),
}

impl ScannerBackend {
    pub fn from_settings(settings: &ScanSettings) -> Result<Self, CoreError> {
        Ok(match settings.backend {
            ScanBackend::Tcping => Self::Tcping(TcpPingScanner::new(settings.clone())),
            ScanBackend::Command => {
                let command = settings.command.clone().ok_or_else(|| {
                    CoreError::config("scan backend `command` requires a scan command")
                })?;
                Self::Command(CommandScanner::new(command))
            }
            ScanBackend::Existing => Self::Existing(ExistingArtifact),
        })
    }

    pub fn kind(&self) -> ScanBackend {
        match self {
            Self::Tcping(_) => ScanBackend::Tcping,
            Self::Command(_) => ScanBackend::Command,
            Self::Existing(_) => ScanBackend::Existing,
        }
    }
}

impl Scanner for ScannerBackend {
    async fn scan(&self, output: &Path) -> Result<ScanSummary, CoreError> {
        match self {
            Self::Tcping(s) => s.scan(output).await,
            Self::Command(s) => s.scan(output).await,
            Self::Existing(s) => s.scan(output).await,
        }
    }
}
