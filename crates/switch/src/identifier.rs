//! Endpoint identifiers and the XOR distance metric.
//!
//! An [`Identifier`] is the BLAKE3 hash of an endpoint's canonical
//! `ip:port` string. Distance between two identifiers is the bit length of
//! their XOR: identifiers sharing more leading bits are closer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::SwitchError;

/// Identifier length in bytes.
pub const IDENTIFIER_LEN: usize = 32;

/// Largest possible distance between two identifiers.
pub const MAX_DISTANCE: u32 = (IDENTIFIER_LEN * 8) as u32;

/// Fixed-length hash of an endpoint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

impl Identifier {
    /// Hash an endpoint address.
    pub fn of(endpoint: &SocketAddr) -> Self {
        Self::of_str(&endpoint.to_string())
    }

    /// Hash a canonical `ip:port` string.
    pub fn of_str(endpoint: &str) -> Self {
        Self(*blake3::hash(endpoint.as_bytes()).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTIFIER_LEN] {
        &self.0
    }

    /// Bit length of `self XOR other`; 0 iff the identifiers are equal.
    pub fn distance(&self, other: &Identifier) -> u32 {
        for (idx, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let diff = a ^ b;
            if diff != 0 {
                let shared = (idx * 8) as u32 + diff.leading_zeros();
                return MAX_DISTANCE - shared;
            }
        }
        0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "Identifier({})", &hex::encode(self.0)[..12])
    }
}

impl FromStr for Identifier {
    type Err = SwitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| SwitchError::InvalidIdentifier(e.to_string()))?;
        let bytes: [u8; IDENTIFIER_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            SwitchError::InvalidIdentifier(format!(
                "expected {IDENTIFIER_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
