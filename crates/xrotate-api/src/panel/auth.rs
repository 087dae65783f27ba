// Panel session login
//
// The panel issues its session as a cookie on `POST /login`. The cookie
// value is captured by hand from `Set-Cookie` and becomes the
// `SessionToken` every later call carries.

use reqwest::header::SET_COOKIE;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::Error;
use crate::panel::client::PanelClient;

/// Opaque session credential for one panel session.
///
/// Never persisted and never printed: `Debug` is redacted by `secrecy`.
#[derive(Debug, Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// The raw cookie value.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub(crate) fn cookie_header(&self, cookie_name: &str) -> String {
        format!("{cookie_name}={}", self.0.expose_secret())
    }
}

impl PanelClient {
    /// Authenticate with username/password.
    ///
    /// Submits form-encoded credentials to `POST {base}/login` and extracts
    /// the session cookie from the response. The panel's status code is not
    /// trusted either way: without the cookie there is no session, so a
    /// missing cookie is an authentication failure even on HTTP 200.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<SessionToken, Error> {
        let url = self.endpoint("login")?;
        debug!("logging in at {}", url);

        let resp = self
            .http()
            .post(url)
            .form(&[
                ("username", username),
                ("password", password.expose_secret()),
            ])
            .send()
            .await?;

        let status = resp.status();
        let token = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|line| cookie_value(line, self.cookie_name()));

        match token {
            Some(value) => {
                debug!(%status, "login successful");
                Ok(SessionToken::new(value))
            }
            None => Err(Error::Authentication {
                message: format!(
                    "session cookie `{}` missing from login response (HTTP {status})",
                    self.cookie_name()
                ),
            }),
        }
    }

    /// End the session. Best effort: the panel's answer is ignored.
    pub async fn logout(&self, token: &SessionToken) -> Result<(), Error> {
        let url = self.endpoint("logout")?;
        debug!("logging out at {}", url);

        let _resp = self
            .http()
            .get(url)
            .header(
                reqwest::header::COOKIE,
                token.cookie_header(self.cookie_name()),
            )
            .send()
            .await?;
        Ok(())
    }
}

/// Extract `value` from a `Set-Cookie` line of the form `name=value; ...`.
/// An empty value (a cookie deletion) does not count.
fn cookie_value(line: &str, name: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(name)?.strip_prefix('=')?;
    let value = rest.split(';').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_owned())
}
