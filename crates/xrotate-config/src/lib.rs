//! Configuration for xrotate.
//!
//! Layers, lowest precedence first: built-in defaults, the TOML config
//! file, then environment variables. The environment keys are the flat
//! names operators already use in container deployments (`XUI_URL`,
//! `SCAN_N`, `CRON_MINUTES`, ...). The result translates into an
//! immutable [`xrotate_core::PipelineConfig`]; the CLI applies its flag
//! overrides on the [`Config`] before translating.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
    util::bool_from_str_or_int,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use xrotate_core::{
    ArtifactPaths, CoreError, DEFAULT_INTERVAL_MINUTES, DEFAULT_SESSION_COOKIE,
    DEFAULT_TAG_PREFIX, PanelSettings, PipelineConfig, ScanBackend, ScanSettings,
};

/// Keyring service name for stored panel passwords.
pub const KEYRING_SERVICE: &str = "xrotate";

/// Environment variable holding the panel password. Read directly rather
/// than through figment so numeric-looking passwords stay strings.
pub const PASSWORD_ENV: &str = "XUI_PASSWORD";

/// Environment variable → config key.
pub const ENV_KEYS: &[(&str, &str)] = &[
    ("XUI_URL", "panel.url"),
    ("XUI_USERNAME", "panel.username"),
    ("XUI_ALLOW_INSECURE", "panel.insecure"),
    ("XUI_TIMEOUT", "panel.timeout"),
    ("XUI_COOKIE_NAME", "panel.cookie_name"),
    ("OUTBOUND_PREFIX", "prefix"),
    ("CRON_MINUTES", "interval_minutes"),
    ("TEMPLATE_DIR", "paths.template_dir"),
    ("GENERATED_OUTBOUNDS", "paths.generated"),
    ("SCAN_O", "paths.scan_result"),
    ("SCAN_BACKEND", "scan.backend"),
    ("SCAN_COMMAND", "scan.command"),
    ("SCAN_N", "scan.concurrency"),
    ("SCAN_T", "scan.ping_times"),
    ("SCAN_TP", "scan.port"),
    ("SCAN_TL", "scan.max_latency_ms"),
    ("SCAN_TLL", "scan.min_latency_ms"),
    ("SCAN_TLR", "scan.max_loss_rate"),
    ("SCAN_F", "scan.ranges_file"),
    ("SCAN_IP", "scan.ranges"),
    ("SCAN_ALLIP", "scan.test_all"),
];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password for {user}: set XUI_PASSWORD or run `xrotate config set-password`")]
    NoCredentials { user: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Tag prefix marking managed outbounds.
    pub prefix: String,

    /// Minutes between scheduled cycles.
    pub interval_minutes: u64,

    pub panel: PanelSection,
    pub paths: PathsSection,
    pub scan: ScanSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TAG_PREFIX.into(),
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            panel: PanelSection::default(),
            paths: PathsSection::default(),
            scan: ScanSection::default(),
        }
    }
}

/// `[panel]`: how to reach the 3x-ui panel.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelSection {
    /// Panel base URL, including any secret web path.
    pub url: Option<String>,

    pub username: Option<String>,

    /// Password (plaintext; prefer the keyring or `XUI_PASSWORD`).
    pub password: Option<String>,

    /// Skip TLS certificate verification.
    #[serde(deserialize_with = "bool_from_str_or_int")]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Request timeout in seconds.
    pub timeout: u64,

    pub cookie_name: String,
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            insecure: false,
            ca_cert: None,
            timeout: 30,
            cookie_name: DEFAULT_SESSION_COOKIE.into(),
        }
    }
}

/// `[paths]`: artifact locations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsSection {
    pub scan_result: PathBuf,
    pub template_dir: PathBuf,
    pub generated: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        let ArtifactPaths {
            scan_result,
            template_dir,
            generated,
        } = ArtifactPaths::default();
        Self {
            scan_result,
            template_dir,
            generated,
        }
    }
}

/// `[scan]`: scanner backend and probe settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    /// `tcping`, `command`, or `none`.
    pub backend: String,

    /// External scanner command line for the `command` backend.
    pub command: Option<String>,

    /// File of IP ranges. Empty disables it.
    pub ranges_file: Option<PathBuf>,

    /// Extra comma-separated ranges.
    pub ranges: Option<String>,

    pub port: u16,
    pub ping_times: u32,
    pub concurrency: usize,
    pub connect_timeout_ms: u64,
    pub max_latency_ms: u64,
    pub min_latency_ms: u64,
    pub max_loss_rate: f64,

    #[serde(deserialize_with = "bool_from_str_or_int")]
    pub test_all: bool,
}

impl Default for ScanSection {
    fn default() -> Self {
        let s = ScanSettings::default();
        Self {
            backend: s.backend.to_string(),
            command: None,
            ranges_file: s.ranges_file,
            ranges: None,
            port: s.port,
            ping_times: s.ping_times,
            concurrency: s.concurrency,
            connect_timeout_ms: millis(s.connect_timeout),
            max_latency_ms: millis(s.max_latency),
            min_latency_ms: millis(s.min_latency),
            max_loss_rate: s.max_loss_rate,
            test_all: s.test_all,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "xrotate", "xrotate").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("xrotate");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// The layered provider stack for `path`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::raw().filter_map(|key| {
            ENV_KEYS
                .iter()
                .find(|(name, _)| key == *name)
                .map(|(_, target)| (*target).into())
        }))
}

/// Load the config from `path` (missing file is fine) and the environment.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    Ok(figment(path).extract()?)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

/// Keyring account for a panel login: `<username>@<host>`.
pub fn keyring_user(username: &str, url: &Url) -> String {
    format!("{username}@{}", url.host_str().unwrap_or("localhost"))
}

/// Resolve the panel password: `XUI_PASSWORD`, then the config file, then
/// the system keyring.
pub fn resolve_password(
    panel: &PanelSection,
    username: &str,
    url: &Url,
) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(SecretString::from(pw));
        }
    }

    // 2. Plaintext in config
    if let Some(pw) = panel.password.as_ref().filter(|pw| !pw.is_empty()) {
        return Ok(SecretString::from(pw.clone()));
    }

    // 3. Keyring
    let user = keyring_user(username, url);
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &user) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    Err(ConfigError::NoCredentials { user })
}

/// Store a panel password in the system keyring.
pub fn store_password(username: &str, url: &Url, password: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(username, url))?;
    entry.set_password(password.expose_secret())?;
    Ok(())
}

// ── Translation to PipelineConfig ───────────────────────────────────

impl Config {
    /// The panel URL, parsed.
    pub fn panel_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .panel
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| invalid("panel.url", "not set (XUI_URL)"))?;
        raw.trim()
            .parse()
            .map_err(|e| invalid("panel.url", format!("{raw}: {e}")))
    }

    /// The panel username.
    pub fn panel_username(&self) -> Result<&str, ConfigError> {
        self.panel
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| invalid("panel.username", "not set (XUI_USERNAME)"))
    }

    /// Resolve panel connection settings, including the password.
    pub fn panel_settings(&self) -> Result<PanelSettings, ConfigError> {
        let url = self.panel_url()?;
        let username = self.panel_username()?.to_owned();
        let password = resolve_password(&self.panel, &username, &url)?;
        Ok(PanelSettings {
            url,
            username,
            password,
            insecure: self.panel.insecure,
            ca_cert: self.panel.ca_cert.clone(),
            timeout: Duration::from_secs(self.panel.timeout),
            cookie_name: self.panel.cookie_name.clone(),
        })
    }

    /// Scanner settings.
    pub fn scan_settings(&self) -> Result<ScanSettings, ConfigError> {
        let s = &self.scan;
        let backend: ScanBackend = s.backend.parse().map_err(|_| {
            invalid(
                "scan.backend",
                format!("expected tcping, command or none, got '{}'", s.backend),
            )
        })?;
        let command = s
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(str::parse)
            .transpose()?;
        let inline_ranges = s
            .ranges
            .as_deref()
            .map(|r| {
                r.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ScanSettings {
            backend,
            ranges_file: s
                .ranges_file
                .clone()
                .filter(|p| !p.as_os_str().is_empty()),
            inline_ranges,
            port: s.port,
            ping_times: s.ping_times,
            concurrency: s.concurrency,
            connect_timeout: Duration::from_millis(s.connect_timeout_ms),
            max_latency: Duration::from_millis(s.max_latency_ms),
            min_latency: Duration::from_millis(s.min_latency_ms),
            max_loss_rate: s.max_loss_rate,
            test_all: s.test_all,
            command,
        })
    }

    /// Build a validated `PipelineConfig`.
    ///
    /// With `with_panel` unset the panel section is skipped entirely, so
    /// the scan and generate phases run without credentials.
    pub fn pipeline_config(&self, with_panel: bool) -> Result<PipelineConfig, ConfigError> {
        let panel = if with_panel {
            Some(self.panel_settings()?)
        } else {
            None
        };
        let config = PipelineConfig {
            panel,
            paths: ArtifactPaths {
                scan_result: self.paths.scan_result.clone(),
                template_dir: self.paths.template_dir.clone(),
                generated: self.paths.generated.clone(),
            },
            scan: self.scan_settings()?,
            tag_prefix: self.prefix.trim().to_owned(),
            interval_minutes: self.interval_minutes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Copy with the plaintext password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.panel.password.is_some() {
            cfg.panel.password = Some("********".into());
        }
        cfg
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
