// Xray settings and service control endpoints.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::panel::auth::SessionToken;
use crate::panel::client::PanelClient;
use crate::panel::models::PanelConfig;

impl PanelClient {
    /// Fetch the live configuration.
    ///
    /// `POST {base}/panel/xray/` answers with `{success, msg, obj}` where
    /// `obj` is a JSON-encoded string holding `xraySetting` and friends.
    pub async fn fetch_config(&self, token: &SessionToken) -> Result<PanelConfig, Error> {
        let url = self.endpoint("panel/xray/")?;
        let resp = self.send(url, token, None).await?;
        let config = self.parse_settings(resp).await?;
        let count = config.outbounds().map(<[Value]>::len).unwrap_or_default();
        debug!(outbounds = count, "fetched panel configuration");
        Ok(config)
    }

    /// Replace the panel's `xraySetting` wholesale.
    ///
    /// The setting is serialized into the `xraySetting` form field of
    /// `POST {base}/panel/xray/update`.
    pub async fn update_xray_setting(
        &self,
        token: &SessionToken,
        xray_setting: &Map<String, Value>,
    ) -> Result<(), Error> {
        let url = self.endpoint("panel/xray/update")?;
        let payload = serde_json::to_string(xray_setting).map_err(|e| Error::Deserialization {
            message: format!("failed to encode xraySetting: {e}"),
            body: String::new(),
        })?;
        let resp = self
            .send(url, token, Some(&[("xraySetting", payload.as_str())]))
            .await?;
        self.parse_ack(resp).await
    }

    /// Restart the xray service so a new setting takes effect.
    pub async fn restart_xray(&self, token: &SessionToken) -> Result<(), Error> {
        let url = self.endpoint("panel/api/server/restartXrayService")?;
        let resp = self.send(url, token, None).await?;
        self.parse_ack(resp).await
    }
}
