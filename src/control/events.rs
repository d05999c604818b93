//! Agent events and their JSON rendering.
//!
//! Results the surrounding system may want (connectors, derived keys, newly
//! trusted peer keys) are published as [`AgentEvent`]s. A supervising process
//! reading our stdout receives each one as a JSON-RPC notification:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"$event","params":{"event":"connector_provisioned",...}}
//! ```
//!
//! # Example
//!
//! ```
//! use dpp_agent::control::{build_event_message, AgentEvent};
//!
//! let msg = build_event_message(&AgentEvent::BootstrapKeySaved { index: 3, duplicate_of: None });
//! assert!(msg.contains("\"$event\""));
//! assert!(msg.contains("\"bootstrap_key_saved\""));
//! ```

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use serde_json::json;

/// SSID a connector is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ssid {
    /// Wildcard: any SSID.
    Any,
    /// A specific network name.
    Named(String),
}

impl Ssid {
    /// Interpret an SSID as carried by the engine, where a lone `*` is the
    /// wildcard.
    pub fn from_wire(ssid: &[u8]) -> Self {
        if ssid == b"*" {
            Ssid::Any
        } else {
            Ssid::Named(String::from_utf8_lossy(ssid).into_owned())
        }
    }
}

impl fmt::Display for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ssid::Any => f.write_str("any SSID"),
            Ssid::Named(name) => write!(f, "SSID {}", name),
        }
    }
}

/// Something the agent wants the outside world to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A protocol session concluded.
    SessionFinished {
        reason: u16,
        #[serde(serialize_with = "serialize_key")]
        key: Option<Vec<u8>>,
    },
    /// A connector was issued to this device.
    ConnectorProvisioned {
        role: String,
        ssid: Ssid,
        connector: String,
    },
    /// A peer key was added to the trust store.
    BootstrapKeySaved {
        index: u32,
        duplicate_of: Option<u32>,
    },
    /// The engine asked to move to another channel.
    ChannelChange { opclass: u8, channel: u8 },
    /// The engine asked to move to another frequency.
    FrequencyChange { frequency: u32 },
}

fn serialize_key<S>(key: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match key {
        Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Build the `$event` JSON-RPC notification for `event`.
pub fn build_event_message(event: &AgentEvent) -> String {
    let msg = json!({
        "jsonrpc": "2.0",
        "method": "$event",
        "params": event,
    });

    msg.to_string()
}
