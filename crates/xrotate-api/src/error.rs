use thiserror::Error;

/// Top-level error type for the `xrotate-api` crate.
///
/// Covers every failure mode of a panel interaction: login, transport,
/// envelope decoding, and structural problems in the returned document.
/// `xrotate-core` maps these into pipeline-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login did not yield a session, or the panel rejected the session.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Panel API ───────────────────────────────────────────────────
    /// The panel reported a failure (`success: false`), or answered with a
    /// non-2xx status. Carries the server message.
    #[error("Panel API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An expected field is absent from a panel document.
    #[error("Missing field `{field}` in panel response")]
    MissingField { field: &'static str },
}

impl Error {
    /// Returns `true` if the session is missing or was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying on the
    /// next scheduled cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }
}
