// ── Runtime pipeline configuration ──
//
// Everything a pipeline run needs, resolved once at startup and then
// passed by reference. Core never reads config files or the environment;
// the CLI builds a `PipelineConfig` and hands it in.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;
pub use xrotate_api::DEFAULT_SESSION_COOKIE;
use xrotate_api::{TlsMode, TransportConfig};

use crate::error::CoreError;

/// Tag namespace marking outbounds owned by this pipeline.
pub const DEFAULT_TAG_PREFIX: &str = "cf-clean-";
/// Minutes between scheduled cycles.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;
/// Upper bound on concurrent TCP probes.
pub const MAX_SCAN_CONCURRENCY: usize = 1000;

/// Panel connection settings.
#[derive(Debug, Clone)]
pub struct PanelSettings {
    /// Panel base URL, including any secret path prefix.
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Custom CA certificate file.
    pub ca_cert: Option<PathBuf>,
    pub timeout: Duration,
    /// Name of the session cookie issued at login.
    pub cookie_name: String,
}

impl PanelSettings {
    /// Transport settings for the panel HTTP client.
    pub fn transport(&self) -> TransportConfig {
        let tls = if self.insecure {
            TlsMode::DangerAcceptInvalid
        } else if let Some(ref ca) = self.ca_cert {
            TlsMode::CustomCa(ca.clone())
        } else {
            TlsMode::System
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}

/// File locations of the artifacts handed between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// IP-quality CSV written by the scanner.
    pub scan_result: PathBuf,
    /// Directory of `*.json` outbound templates.
    pub template_dir: PathBuf,
    /// Generated-outbound JSON array.
    pub generated: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            scan_result: "ip-scan-result.csv".into(),
            template_dir: "configs".into(),
            generated: "generated-outbounds.json".into(),
        }
    }
}

/// Which scanner produces the IP-quality artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ScanBackend {
    /// Built-in TCP connect latency prober.
    Tcping,
    /// External scanner program.
    Command,
    /// Reuse the artifact already on disk.
    #[strum(to_string = "existing", serialize = "none")]
    Existing,
}

/// External scanner invocation. `{output}` in any argument is replaced by
/// the scan artifact path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FromStr for ScanCommand {
    type Err = CoreError;

    /// Split a whitespace-separated command line. No shell quoting.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace().map(str::to_owned);
        let program = parts
            .next()
            .ok_or_else(|| CoreError::config("scan command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub backend: ScanBackend,
    /// File of IP ranges, one address or CIDR per line.
    pub ranges_file: Option<PathBuf>,
    /// Extra ranges given inline.
    pub inline_ranges: Vec<String>,
    /// TCP port probed on each candidate.
    pub port: u16,
    /// Connection attempts per candidate.
    pub ping_times: u32,
    /// Concurrent probes.
    pub concurrency: usize,
    pub connect_timeout: Duration,
    /// Candidates averaging above this latency are dropped.
    pub max_latency: Duration,
    /// Candidates averaging below this latency are dropped.
    pub min_latency: Duration,
    /// Candidates losing more than this fraction of attempts are dropped.
    pub max_loss_rate: f64,
    /// Probe every IPv4 host instead of one per /24.
    pub test_all: bool,
    pub command: Option<ScanCommand>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            backend: ScanBackend::Tcping,
            ranges_file: Some("ip.txt".into()),
            inline_ranges: Vec::new(),
            port: 443,
            ping_times: 4,
            concurrency: 200,
            connect_timeout: Duration::from_secs(1),
            max_latency: Duration::from_millis(9999),
            min_latency: Duration::ZERO,
            max_loss_rate: 1.0,
            test_all: false,
            command: None,
        }
    }
}

/// Configuration for the whole pipeline.
///
/// Built by the CLI, passed to [`Pipeline`](crate::Pipeline). Immutable
/// once constructed.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Panel connection; only the update phase needs it.
    pub panel: Option<PanelSettings>,
    pub paths: ArtifactPaths,
    pub scan: ScanSettings,
    /// Tag prefix identifying managed outbounds.
    pub tag_prefix: String,
    /// Minutes between scheduled cycles (at least 1).
    pub interval_minutes: u64,
}

impl PipelineConfig {
    /// Wall-clock wait between scheduled cycles.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Panel settings, or a configuration error naming what is missing.
    pub fn panel(&self) -> Result<&PanelSettings, CoreError> {
        self.panel
            .as_ref()
            .ok_or_else(|| CoreError::config("panel URL and credentials are not configured"))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tag_prefix.trim().is_empty() {
            return Err(CoreError::config(
                "tag prefix must not be empty (it would mark every outbound as managed)",
            ));
        }
        if self.interval_minutes < 1 {
            return Err(CoreError::config("interval must be at least 1 minute"));
        }
        let scan = &self.scan;
        if scan.ping_times == 0 {
            return Err(CoreError::config("scan ping count must be at least 1"));
        }
        if scan.concurrency == 0 || scan.concurrency > MAX_SCAN_CONCURRENCY {
            return Err(CoreError::config(format!(
                "scan concurrency must be between 1 and {MAX_SCAN_CONCURRENCY}"
            )));
        }
        if !(0.0..=1.0).contains(&scan.max_loss_rate) {
            return Err(CoreError::config("max loss rate must be within 0.00..=1.00"));
        }
        if scan.min_latency > scan.max_latency {
            return Err(CoreError::config(
                "minimum latency must not exceed maximum latency",
            ));
        }
        if scan.backend == ScanBackend::Command && scan.command.is_none() {
            return Err(CoreError::config(
                "scan backend `command` requires a scan command",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            panel: Some(PanelSettings {
                url: Url::parse("https://panel.example.com:2053").expect("valid URL"),
                username: "admin".into(),
                password: SecretString::from("pw".to_string()),
                insecure: false,
                ca_cert: None,
                timeout: Duration::from_secs(30),
                cookie_name: "3x-ui".into(),
            }),
            paths: ArtifactPaths::default(),
            scan: ScanSettings::default(),
            tag_prefix: DEFAULT_TAG_PREFIX.into(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }

    #[test]
    fn defaults_are_valid() {
        config().validate().expect("defaults validate");
        assert_eq!(config().interval(), Duration::from_secs(3600));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let mut cfg = config();
        cfg.tag_prefix = "  ".into();
        assert!(matches!(cfg.validate(), Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut cfg = config();
        cfg.interval_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn command_backend_needs_command() {
        let mut cfg = config();
        cfg.scan.backend = ScanBackend::Command;
        assert!(cfg.validate().is_err());
        cfg.scan.command = Some("cfscanner -o {output}".parse().expect("non-empty"));
        cfg.validate().expect("command present");
    }

    #[test]
    fn insecure_wins_over_custom_ca() {
        let mut panel = config().panel.expect("panel configured");
        panel.insecure = true;
        panel.ca_cert = Some("/etc/ssl/panel.pem".into());
        assert_eq!(panel.transport().tls, TlsMode::DangerAcceptInvalid);
    }

    #[test]
    fn missing_panel_is_reported_on_use() {
        let mut cfg = config();
        cfg.panel = None;
        cfg.validate().expect("panel is optional");
        assert!(matches!(cfg.panel(), Err(CoreError::Configuration { .. })));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("TCPing".parse::<ScanBackend>().ok(), Some(ScanBackend::Tcping));
        assert_eq!("none".parse::<ScanBackend>().ok(), Some(ScanBackend::Existing));
        assert_eq!(ScanBackend::Existing.to_string(), "existing");
    }
}
