// ── Domain model ──

pub mod device;
pub mod value;

pub use device::{is_virtual_sensor, Category, Device, GroupInfo, LightInfo, SensorInfo};

use serde::Serialize;

use hue2mqtt_api::BridgeInfo;

/// Bridge availability heartbeat, published on every transition.
///
/// Offline bodies omit the `bridge` object entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge: Option<BridgeInfo>,
}

impl BridgeStatus {
    pub fn online(bridge: BridgeInfo) -> Self {
        Self {
            online: true,
            bridge: Some(bridge),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            bridge: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_status_omits_bridge_object() {
        let body = serde_json::to_string(&BridgeStatus::offline()).unwrap();
        assert_eq!(body, r#"{"online":false}"#);
    }

    #[test]
    fn online_status_carries_bridge_identity() {
        let status = BridgeStatus::online(BridgeInfo {
            name: "Hallway Bridge".into(),
            mac_address: "00:11:22:33:44:55".into(),
            api_version: "1.16.0".into(),
        });
        let body: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&status).unwrap()).unwrap();
        assert_eq!(body["online"], serde_json::json!(true));
        assert_eq!(body["bridge"]["mac_address"], "00:11:22:33:44:55");
    }
}
