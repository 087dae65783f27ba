// ── Outbound documents ──
//
// Templates and generated outbounds are untyped JSON objects: the shape of
// `settings` is protocol-specific and anything we don't rewrite must pass
// through to the panel untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// The `protocol` field of an outbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    Trojan,
    Vless,
    /// Anything else, passed through without rewriting.
    Other(String),
}

impl Protocol {
    pub fn parse(name: &str) -> Self {
        match name {
            "trojan" => Self::Trojan,
            "vless" => Self::Vless,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Trojan => "trojan",
            Self::Vless => "vless",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag of a managed outbound: `<prefix><protocol>-<ip>`.
pub fn managed_tag(prefix: &str, protocol: &Protocol, address: &str) -> String {
    format!("{prefix}{protocol}-{address}")
}

/// A protocol outbound loaded from the template directory.
///
/// Read-only: expansion clones the document before rewriting it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundTemplate {
    source: String,
    document: Map<String, Value>,
}

impl OutboundTemplate {
    pub fn new(source: impl Into<String>, document: Map<String, Value>) -> Self {
        Self {
            source: source.into(),
            document,
        }
    }

    /// Decode a template file's contents. `source` names the file in errors.
    pub fn from_json(source: &str, text: &str) -> Result<Self, CoreError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(document)) => Ok(Self::new(source, document)),
            Ok(_) => Err(CoreError::parse(source, "template must be a JSON object")),
            Err(e) => Err(CoreError::parse(source, e.to_string())),
        }
    }

    /// File name the template came from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::parse(
            self.document
                .get("protocol")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        )
    }
}

/// A template instantiated for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedOutbound(Map<String, Value>);

impl GeneratedOutbound {
    pub fn new(document: Map<String, Value>) -> Self {
        Self(document)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn tag(&self) -> Option<&str> {
        self.0.get("tag").and_then(Value::as_str)
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::parse(
            self.0
                .get("protocol")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<GeneratedOutbound> for Value {
    fn from(outbound: GeneratedOutbound) -> Self {
        Value::Object(outbound.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_round_trips_names() {
        assert_eq!(Protocol::parse("trojan"), Protocol::Trojan);
        assert_eq!(Protocol::parse("vless"), Protocol::Vless);
        assert_eq!(Protocol::parse("vmess").as_str(), "vmess");
    }

    #[test]
    fn managed_tag_format() {
        assert_eq!(
            managed_tag("cf-clean-", &Protocol::Trojan, "198.51.100.7"),
            "cf-clean-trojan-198.51.100.7"
        );
        assert_eq!(
            managed_tag("x-", &Protocol::Vless, "2606:4700::1"),
            "x-vless-2606:4700::1"
        );
    }

    #[test]
    fn template_must_be_an_object() {
        let err = OutboundTemplate::from_json("list.json", "[]").expect_err("array rejected");
        match err {
            CoreError::Parse { origin, .. } => assert_eq!(origin, "list.json"),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_protocol_reads_as_other() {
        let template = OutboundTemplate::from_json("t.json", r#"{"settings":{}}"#)
            .expect("valid object");
        assert_eq!(template.protocol(), Protocol::Other(String::new()));
    }
}
