// Panel HTTP client
//
// Wraps `reqwest::Client` with panel URL construction, session cookie
// attachment, and the two response shapes the panel produces: the full
// `{success, msg, obj}` envelope and the bare acknowledgement that may
// come back as an empty body.

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::panel::auth::SessionToken;
use crate::panel::models::{Envelope, PanelConfig};
use crate::transport::TransportConfig;

/// Cookie name the 3x-ui panel uses for its session.
pub const DEFAULT_SESSION_COOKIE: &str = "3x-ui";

const BODY_PREVIEW_CHARS: usize = 200;

/// HTTP client for one 3x-ui panel.
///
/// Holds no session state: [`login`](Self::login) hands back a
/// [`SessionToken`] and every other call takes it explicitly. The base URL
/// may carry a path prefix (panels are often served under a secret path),
/// so endpoint URLs are built by concatenation rather than `Url::join`.
#[derive(Debug, Clone)]
pub struct PanelClient {
    http: reqwest::Client,
    base_url: Url,
    cookie_name: String,
}

impl PanelClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            cookie_name: DEFAULT_SESSION_COOKIE.to_owned(),
        }
    }

    /// Use a different session cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// The session cookie name.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}{path}` with exactly one slash between them.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Start a POST carrying the session cookie.
    pub(crate) fn session_post(&self, url: Url, token: &SessionToken) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header(COOKIE, token.cookie_header(&self.cookie_name))
    }

    /// Send a session POST with an optional form body.
    pub(crate) async fn send(
        &self,
        url: Url,
        token: &SessionToken,
        form: Option<&[(&str, &str)]>,
    ) -> Result<reqwest::Response, Error> {
        debug!("POST {}", url);
        let builder = self.session_post(url, token);
        let builder = match form {
            Some(fields) => builder
                .header(
                    CONTENT_TYPE,
                    "application/x-www-form-urlencoded; charset=UTF-8",
                )
                .form(fields),
            None => builder,
        };
        Ok(builder.send().await?)
    }

    /// Parse the `{success, msg, obj}` envelope of a settings read and
    /// decode the JSON-encoded `obj` string into a [`PanelConfig`].
    pub(crate) async fn parse_settings(&self, resp: reqwest::Response) -> Result<PanelConfig, Error> {
        let status = resp.status();
        reject_unauthorized(status)?;

        let body = resp.text().await?;
        trace!(%status, bytes = body.len(), "settings response");

        if !status.is_success() {
            return Err(http_error(status, &body));
        }

        let envelope = decode_envelope(&body)?;
        if !envelope.success {
            return Err(Error::Api {
                message: envelope.msg,
                status: Some(status.as_u16()),
            });
        }

        match envelope.obj {
            Some(serde_json::Value::String(text)) => PanelConfig::from_json(&text),
            Some(serde_json::Value::Object(document)) => Ok(PanelConfig::from_document(document)),
            _ => Err(Error::MissingField { field: "obj" }),
        }
    }

    /// Interpret a mutation acknowledgement.
    ///
    /// The panel answers some writes with an empty body; with a 2xx status
    /// that counts as success. A non-empty body must be a `{success, msg}`
    /// envelope reporting success.
    pub(crate) async fn parse_ack(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        reject_unauthorized(status)?;

        let body = resp.text().await?;
        let trimmed = body.trim();

        if trimmed.is_empty() {
            if status.is_success() {
                trace!(%status, "empty acknowledgement");
                return Ok(());
            }
            return Err(Error::Api {
                message: format!("HTTP {status} with empty body"),
                status: Some(status.as_u16()),
            });
        }

        if !status.is_success() {
            return Err(match serde_json::from_str::<Envelope>(trimmed) {
                Ok(envelope) if !envelope.msg.is_empty() => Error::Api {
                    message: envelope.msg,
                    status: Some(status.as_u16()),
                },
                _ => http_error(status, trimmed),
            });
        }

        let envelope = decode_envelope(trimmed)?;
        if !envelope.success {
            return Err(Error::Api {
                message: envelope.msg,
                status: Some(status.as_u16()),
            });
        }
        Ok(())
    }
}

fn reject_unauthorized(status: StatusCode) -> Result<(), Error> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            message: format!("session rejected by panel (HTTP {status})"),
        });
    }
    Ok(())
}

fn decode_envelope(body: &str) -> Result<Envelope, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

fn http_error(status: StatusCode, body: &str) -> Error {
    Error::Api {
        message: format!("HTTP {status}: {}", preview(body)),
        status: Some(status.as_u16()),
    }
}

/// First few hundred characters of a body, cut on a char boundary.
pub(crate) fn preview(body: &str) -> &str {
    match body.char_indices().nth(BODY_PREVIEW_CHARS) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> PanelClient {
        PanelClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).expect("valid base URL"),
        )
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let c = client("https://panel.example.com:2053/secret/");
        assert_eq!(
            c.endpoint("/panel/xray/").expect("valid").as_str(),
            "https://panel.example.com:2053/secret/panel/xray/"
        );
    }

    #[test]
    fn endpoint_without_prefix() {
        let c = client("http://127.0.0.1:2053");
        assert_eq!(
            c.endpoint("login").expect("valid").as_str(),
            "http://127.0.0.1:2053/login"
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
