//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `PipelineError` and `ConfigError` into user-facing
//! errors with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use xrotate_config::ConfigError;
use xrotate_core::{CoreError, PipelineError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    /// A pipeline phase failed for a reason without a more specific code.
    pub const PHASE: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the panel at {url}")]
    #[diagnostic(
        code(xrotate::connection_failed),
        help(
            "Check that the panel is running and that XUI_URL includes its web base path.\n\
             Reason: {reason}\n\
             For a self-signed certificate, retry with --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Panel login failed: {message}")]
    #[diagnostic(
        code(xrotate::auth_failed),
        help(
            "Verify XUI_USERNAME and the password.\n\
             Store a new password with: xrotate config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No panel password for {user}")]
    #[diagnostic(
        code(xrotate::no_credentials),
        help(
            "Set XUI_PASSWORD, add `password` under [panel] in the config file,\n\
             or run: xrotate config set-password"
        )
    )]
    NoCredentials { user: String },

    // ── Panel ────────────────────────────────────────────────────────
    #[error("Panel API error: {message}")]
    #[diagnostic(code(xrotate::api_error))]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Artifacts ────────────────────────────────────────────────────
    #[error("Cannot access {path}")]
    #[diagnostic(
        code(xrotate::io),
        help("Run the earlier phases first (`xrotate scan`, `xrotate generate`) or fix the path.")
    )]
    Artifact {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {origin}: {message}")]
    #[diagnostic(code(xrotate::parse))]
    Parse { origin: String, message: String },

    #[error("Scanner failed: {message}")]
    #[diagnostic(
        code(xrotate::scanner),
        help("Check SCAN_BACKEND and SCAN_COMMAND, or use SCAN_BACKEND=none to reuse the last scan.")
    )]
    Scanner { message: String },

    // ── Validation / configuration ───────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(xrotate::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(xrotate::configuration))]
    Configuration { message: String },

    #[error("Config loading failed: {message}")]
    #[diagnostic(
        code(xrotate::config),
        help("Check the config file with: xrotate config show")
    )]
    Config { message: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(code(xrotate::keyring))]
    Keyring { reason: String },

    // ── Pipeline ─────────────────────────────────────────────────────
    #[error("{phase} phase failed")]
    #[diagnostic(code(xrotate::phase_failed))]
    PhaseFailed {
        phase: String,
        #[source]
        inner: Box<CliError>,
    },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(xrotate::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } => exit_code::USAGE,
            Self::PhaseFailed { inner, .. } => match inner.exit_code() {
                exit_code::GENERAL => exit_code::PHASE,
                code => code,
            },
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io { path, source } => CliError::Artifact {
                path: path.display().to_string(),
                source,
            },
            CoreError::Parse { origin, message } => CliError::Parse { origin, message },
            CoreError::Authentication { message } => CliError::AuthFailed { message },
            CoreError::Api { message, status } => CliError::Api { message, status },
            CoreError::Connection { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::Configuration { message } => CliError::Configuration { message },
            CoreError::Scanner { message } => CliError::Scanner { message },
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        CliError::PhaseFailed {
            phase: err.phase.to_string(),
            inner: Box::new(err.source.into()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { user } => CliError::NoCredentials { user },
            ConfigError::Keyring(e) => CliError::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Serialization(e) => CliError::Render(e.to_string()),
            ConfigError::Figment(e) => CliError::Config {
                message: e.to_string(),
            },
            ConfigError::Core(e) => e.into(),
        }
    }
}
