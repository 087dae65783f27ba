// Panel response envelopes and the decoded settings document.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::Error;

/// The `{success, msg, obj}` envelope the panel wraps every response in.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub msg: String,
    /// For the settings endpoint, a JSON-encoded *string* holding the
    /// actual document.
    #[serde(default)]
    pub obj: Option<Value>,
}

/// The panel's live configuration document (the decoded `obj` payload).
///
/// Kept as an untyped JSON object: only `xraySetting.outbounds` is
/// interpreted, and everything else must round-trip untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    document: Map<String, Value>,
}

impl PanelConfig {
    /// Wrap an already-decoded document.
    pub fn from_document(document: Map<String, Value>) -> Self {
        Self { document }
    }

    /// Decode the JSON text carried in the envelope's `obj` field.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: format!("settings payload is not valid JSON: {e}"),
            body: text.to_owned(),
        })?;
        match value {
            Value::Object(document) => Ok(Self { document }),
            other => Err(Error::Deserialization {
                message: format!("settings payload is not an object (got {})", kind(&other)),
                body: text.to_owned(),
            }),
        }
    }

    /// The full document.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// The `xraySetting` object.
    pub fn xray_setting(&self) -> Result<&Map<String, Value>, Error> {
        self.document
            .get("xraySetting")
            .and_then(Value::as_object)
            .ok_or(Error::MissingField {
                field: "xraySetting",
            })
    }

    /// The live `xraySetting.outbounds` list. An absent or non-array field
    /// reads as empty.
    pub fn outbounds(&self) -> Result<&[Value], Error> {
        Ok(self
            .xray_setting()?
            .get("outbounds")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    /// Consume the document, returning only `xraySetting`.
    pub fn into_xray_setting(mut self) -> Result<Map<String, Value>, Error> {
        match self.document.remove("xraySetting") {
            Some(Value::Object(setting)) => Ok(setting),
            _ => Err(Error::MissingField {
                field: "xraySetting",
            }),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn outbounds_default_to_empty() {
        let config = PanelConfig::from_json(r#"{"xraySetting":{"log":{}}}"#)
            .expect("valid document");
        assert!(config.outbounds().expect("xraySetting present").is_empty());
    }

    #[test]
    fn missing_xray_setting_is_reported() {
        let config = PanelConfig::from_json(r#"{"inboundTags":[]}"#).expect("valid document");
        assert!(matches!(
            config.xray_setting(),
            Err(Error::MissingField {
                field: "xraySetting"
            })
        ));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = PanelConfig::from_json("[1,2]").expect_err("array is not a document");
        assert!(matches!(err, Error::Deserialization { .. }));
    }

    #[test]
    fn into_xray_setting_keeps_siblings() {
        let config = PanelConfig::from_document(
            json!({
                "xraySetting": {"outbounds": [{"tag": "direct"}], "routing": {"rules": []}},
                "inboundTags": ["in-1"]
            })
            .as_object()
            .cloned()
            .expect("object literal"),
        );
        let setting = config.into_xray_setting().expect("xraySetting present");
        assert!(setting.contains_key("routing"));
        assert_eq!(setting["outbounds"][0]["tag"], "direct");
    }
}
