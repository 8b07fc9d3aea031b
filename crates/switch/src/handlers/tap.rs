//! `.tap` - standing forwarding requests
//!
//! A peer registers rules describing telexes it wants copies of. The switch
//! relays the signals of every admitted telex matching one of a line's
//! rules to that line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SwitchResult;
use crate::handler::TelexHandler;
use crate::switch::Switch;
use crate::table::LineRef;
use crate::telex::{Telex, TAP_KEY};

/// Rules kept per line; extra rules are dropped.
pub const MAX_TAP_RULES: usize = 16;

/// One tap rule: every `is` pair must be present with an equal value and
/// every `has` key must be present.
///
/// A rule with neither constraint matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TapRule {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub is: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has: Vec<String>,
}

impl TapRule {
    /// Rule matching telexes where `key == value` that also carry all of
    /// `has`.
    pub fn signal(key: &str, value: impl Into<Value>, has: &[&str]) -> Self {
        let mut is = Map::new();
        is.insert(key.to_string(), value.into());
        Self {
            is,
            has: has.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn matches(&self, telex: &Telex) -> bool {
        if self.is.is_empty() && self.has.is_empty() {
            return false;
        }
        let keys = telex.keys();
        self.is
            .iter()
            .all(|(key, value)| telex.get(key) == Some(value))
            && self.has.iter().all(|key| keys.contains(key.as_str()))
    }
}

/// Replaces the sender's tap rules with the ones it sent.
#[derive(Debug, Default)]
pub struct TapHandler;

impl TelexHandler for TapHandler {
    fn name(&self) -> &'static str {
        "tap"
    }

    fn matching_keys(&self) -> &[&'static str] {
        &[TAP_KEY]
    }

    fn validate(&self, telex: &Telex) -> SwitchResult<()> {
        tap_rules(telex).map(|_| ())
    }

    fn handle(&self, _switch: &Switch, line: &LineRef, telex: &Telex) -> SwitchResult<()> {
        let mut rules = tap_rules(telex)?;
        if rules.len() > MAX_TAP_RULES {
            debug!(count = rules.len(), "Dropping tap rules over the limit");
            rules.truncate(MAX_TAP_RULES);
        }

        let mut line = line.lock()?;
        debug!(endpoint = %line.endpoint(), rules = rules.len(), "Registered taps");
        line.taps = rules;
        Ok(())
    }
}

fn tap_rules(telex: &Telex) -> SwitchResult<Vec<TapRule>> {
    let raw = telex.array_field(TAP_KEY)?;
    Ok(serde_json::from_value(Value::Array(raw.clone()))?)
}
