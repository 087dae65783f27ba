// ── Core error types ──
//
// Pipeline-facing errors from xrotate-core. Phases report one of these;
// the runner wraps it with the failing phase name. The
// `From<xrotate_api::Error>` impl translates panel transport errors into
// the same taxonomy.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Artifacts ────────────────────────────────────────────────────
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input in {origin}: {message}")]
    Parse { origin: String, message: String },

    // ── Panel ────────────────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Panel API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Cannot reach panel at {url}: {reason}")]
    Connection { url: String, reason: String },

    // ── Structure / configuration ────────────────────────────────────
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // ── Scanner ──────────────────────────────────────────────────────
    #[error("Scanner failed: {message}")]
    Scanner { message: String },
}

impl CoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(origin: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Parse {
            origin: origin.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

// ── Conversion from panel transport errors ───────────────────────────

impl From<xrotate_api::Error> for CoreError {
    fn from(err: xrotate_api::Error) -> Self {
        match err {
            xrotate_api::Error::Authentication { message } => CoreError::Authentication { message },
            xrotate_api::Error::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::Connection {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            xrotate_api::Error::InvalidUrl(e) => CoreError::Configuration {
                message: format!("Invalid panel URL: {e}"),
            },
            xrotate_api::Error::Tls(reason) => CoreError::Connection {
                url: String::new(),
                reason: format!("TLS error: {reason}"),
            },
            xrotate_api::Error::Api { message, status } => CoreError::Api { message, status },
            xrotate_api::Error::Deserialization { message, body: _ } => CoreError::Parse {
                origin: "panel response".into(),
                message,
            },
            xrotate_api::Error::MissingField { field } => CoreError::Configuration {
                message: format!("panel configuration has no `{field}` field"),
            },
        }
    }
}
