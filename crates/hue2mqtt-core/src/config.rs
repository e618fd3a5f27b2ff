// ── Runtime bridge configuration ──
//
// These types describe *how* the bridge maps devices to topics and
// talks to the broker. They carry validated, ready-to-use values and
// never touch disk -- the binary builds a `BridgeConfig` from the
// config file and hands it in.

use std::str::FromStr;
use std::time::Duration;

use rumqttc::QoS;
use secrecy::SecretString;

use hue2mqtt_api::ReconnectConfig;

// ── Topic mapping ────────────────────────────────────────────────────

/// Device-identity representation used in topic paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopicScheme {
    /// Stable hardware identifier (hub-local id for groups).
    #[default]
    Id,
    /// Lowercased user-assigned name. Follows renames.
    Name,
}

impl TopicScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
        }
    }
}

impl FromStr for TopicScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            other => Err(format!("expected 'id' or 'name', got '{other}'")),
        }
    }
}

/// How device state is mapped onto the topic namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSettings {
    /// Leading topic segment(s), no trailing slash.
    pub prefix: String,
    /// Identity representation in topic paths.
    pub scheme: TopicScheme,
    /// One topic per leaf attribute instead of one JSON body per device.
    pub distinct: bool,
}

impl TopicSettings {
    /// Topic carrying the bridge status heartbeat.
    pub fn status_topic(&self) -> String {
        format!("{}/status", self.prefix)
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            prefix: "hue2mqtt".into(),
            scheme: TopicScheme::Id,
            distinct: false,
        }
    }
}

// ── Broker connection ────────────────────────────────────────────────

/// Username/password pair for broker authentication.
#[derive(Debug, Clone)]
pub struct MqttCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Broker connection and message delivery settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub credentials: Option<MqttCredentials>,
    pub enable_tls: bool,
    pub client_id: String,
    /// QoS for every published message.
    pub qos: QoS,
    /// Retain flag for every published message.
    pub retain: bool,
    /// Suppress re-publication of byte-identical payloads.
    pub cache: bool,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1883,
            credentials: None,
            enable_tls: false,
            client_id: "hue2mqtt".into(),
            qos: QoS::AtLeastOnce,
            retain: true,
            cache: true,
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Map a numeric QoS level to the broker QoS, rejecting anything
/// outside 0..=2 at configuration time.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

// ── BridgeConfig ─────────────────────────────────────────────────────

/// Everything the orchestrator needs, validated and ready to run.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub topics: TopicSettings,
    pub mqtt: MqttSettings,
    pub reconnect: ReconnectConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_parses_case_insensitively() {
        assert_eq!("id".parse::<TopicScheme>().unwrap(), TopicScheme::Id);
        assert_eq!("Name".parse::<TopicScheme>().unwrap(), TopicScheme::Name);
        assert!("friendly".parse::<TopicScheme>().is_err());
    }

    #[test]
    fn qos_levels_map_to_broker_qos() {
        assert_eq!(qos_from_level(0), Some(QoS::AtMostOnce));
        assert_eq!(qos_from_level(1), Some(QoS::AtLeastOnce));
        assert_eq!(qos_from_level(2), Some(QoS::ExactlyOnce));
        assert_eq!(qos_from_level(3), None);
    }

    #[test]
    fn status_topic_is_prefix_scoped() {
        let topics = TopicSettings {
            prefix: "home/hue".into(),
            ..TopicSettings::default()
        };
        assert_eq!(topics.status_topic(), "home/hue/status");
    }
}
