//! Telex - the JSON message exchanged between switches
//!
//! A telex is a flat JSON object. A small closed set of underscore-prefixed
//! fields drive the line handshake; every other key is carried in an open
//! extension bag and interpreted only by the handler that matches it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::net::SocketAddr;

use crate::error::{SwitchError, SwitchResult};

/// Discovery query: value is the hex identifier being looked up.
pub const END_KEY: &str = "+end";
/// Neighbor advertisement: value is a list of `ip:port` strings.
pub const SEE_KEY: &str = ".see";
/// Tap registration: value is a list of tap rules.
pub const TAP_KEY: &str = ".tap";
/// NAT hole-punch request, forwarded to tappers.
pub const POP_KEY: &str = "+pop";
/// Set on telexes relayed to a tapping line; relayed telexes are never
/// relayed again.
pub const HOP_KEY: &str = "_hop";

/// A decoded telex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telex {
    /// Destination address as seen by the sender.
    #[serde(rename = "_to", default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Established line token.
    #[serde(rename = "_line", default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,

    /// Ring token offered while the line is being set up.
    #[serde(rename = "_ring", default, skip_serializing_if = "Option::is_none")]
    pub ring: Option<i64>,

    /// Bytes the sender has received from us so far.
    #[serde(rename = "_br", default, skip_serializing_if = "Option::is_none")]
    pub br: Option<i64>,

    /// Handler-specific keys.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Handshake-relevant subset of a telex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakeFields {
    pub line: Option<i64>,
    pub ring: Option<i64>,
    pub br: Option<i64>,
}

impl Telex {
    /// Start a telex addressed to `endpoint`.
    pub fn to(endpoint: &SocketAddr) -> Self {
        Self {
            to: Some(format_endpoint(endpoint)),
            ..Self::default()
        }
    }

    /// Builder-style insert of an extension field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Signal fields (`+` prefixed), the part of a telex that is relayed.
    pub fn signals(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(key, _)| key.starts_with('+'))
    }

    /// Every key present on the wire, reserved ones included.
    pub fn keys(&self) -> BTreeSet<&str> {
        let mut keys: BTreeSet<&str> = self.fields.keys().map(String::as_str).collect();
        if self.to.is_some() {
            keys.insert("_to");
        }
        if self.line.is_some() {
            keys.insert("_line");
        }
        if self.ring.is_some() {
            keys.insert("_ring");
        }
        if self.br.is_some() {
            keys.insert("_br");
        }
        keys
    }

    pub fn handshake_fields(&self) -> HandshakeFields {
        HandshakeFields {
            line: self.line,
            ring: self.ring,
            br: self.br,
        }
    }

    /// Parse the `_to` field into an endpoint.
    pub fn to_endpoint(&self) -> SwitchResult<SocketAddr> {
        let raw = self.to.as_deref().ok_or_else(|| SwitchError::MalformedField {
            field: "_to".to_string(),
            reason: "missing".to_string(),
        })?;
        parse_endpoint(raw)
    }

    /// String value of an extension field.
    pub fn str_field(&self, key: &str) -> SwitchResult<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| SwitchError::MalformedField {
                field: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    /// Array value of an extension field.
    pub fn array_field(&self, key: &str) -> SwitchResult<&Vec<Value>> {
        self.get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| SwitchError::MalformedField {
                field: key.to_string(),
                reason: "expected an array".to_string(),
            })
    }

    pub fn decode(bytes: &[u8]) -> SwitchResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn encode(&self) -> SwitchResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Parse a canonical `ip:port` string.
pub fn parse_endpoint(raw: &str) -> SwitchResult<SocketAddr> {
    raw.parse()
        .map_err(|_| SwitchError::InvalidEndpoint(raw.to_string()))
}

/// Canonical `ip:port` form used on the wire and for hashing.
pub fn format_endpoint(endpoint: &SocketAddr) -> String {
    endpoint.to_string()
}
