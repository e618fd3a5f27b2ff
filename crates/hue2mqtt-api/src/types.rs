//! Wire types for the hub's REST and WebSocket surfaces.
//!
//! Device bodies are kept as raw `serde_json::Value` maps keyed by the
//! hub-local id -- `hue2mqtt-core` converts them into domain types. Only
//! the envelopes the transport layer must understand are typed here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Handshake ────────────────────────────────────────────────────────

/// Identity of a connected hub, published as part of the bridge status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub name: String,
    pub mac_address: String,
    pub api_version: String,
}

/// Raw `/config` response. Field names follow the hub's wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResponse {
    pub name: String,
    pub mac: String,
    pub apiversion: String,
    /// Port of the push-event WebSocket, if the hub advertises one.
    #[serde(default)]
    pub websocketport: Option<u16>,
}

/// Result of a successful hub handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub bridge: BridgeInfo,
    /// Event WebSocket port advertised by the hub, if any.
    pub event_port: Option<u16>,
}

impl From<ConfigResponse> for Handshake {
    fn from(raw: ConfigResponse) -> Self {
        Self {
            bridge: BridgeInfo {
                name: raw.name,
                mac_address: raw.mac,
                api_version: raw.apiversion,
            },
            event_port: raw.websocketport,
        }
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Full point-in-time dump of the hub's device tables.
///
/// Values are the hub's raw JSON bodies; keys are hub-local ids.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullState {
    #[serde(default)]
    pub lights: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub groups: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub sensors: HashMap<String, serde_json::Value>,
}

impl FullState {
    pub fn device_count(&self) -> usize {
        self.lights.len() + self.groups.len() + self.sensors.len()
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Resource table an event refers to. Wire names are plural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Lights,
    Groups,
    Sensors,
}

/// A partial state-change notification for one device.
///
/// `state` carries changed keys of the device's state tree; `attr`
/// carries changed top-level attributes (e.g. a rename). Either may be
/// absent, never both.
#[derive(Debug, Clone, Deserialize)]
pub struct HubEvent {
    pub resource: Resource,
    pub id: String,
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    #[serde(default)]
    pub attr: Option<serde_json::Value>,
}

// ── REST error envelope ──────────────────────────────────────────────

/// One entry of the hub's response array for writes and registration.
///
/// Every entry is either `{"success": {...}}` or `{"error": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiReply {
    #[serde(default)]
    pub success: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// Body of an `{"error": {...}}` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub address: String,
    pub description: String,
}

/// Hub error codes the client special-cases.
pub(crate) const ERROR_UNAUTHORIZED: i64 = 1;
pub(crate) const ERROR_LINK_BUTTON: i64 = 101;
