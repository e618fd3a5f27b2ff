//! Configuration for the hue2mqtt bridge.
//!
//! TOML file + `HUE2MQTT_`-prefixed environment overrides, translated
//! into the runtime types the bridge consumes (`BridgeConfig`,
//! `HubConfig`). Validation happens here, before any connection is
//! attempted -- a bad `topic_scheme` or QoS level is a startup error,
//! never a runtime one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use hue2mqtt_api::HubConfig;
use hue2mqtt_core::{
    qos_from_level, BridgeConfig, MqttCredentials, MqttSettings, QoS, TopicScheme, TopicSettings,
};

const DEFAULT_HUB_TIMEOUT: Duration = Duration::from_secs(10);

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found (searched: {searched})")]
    NotFound { searched: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML schema ─────────────────────────────────────────────────────

/// Top-level config file. Unknown keys are rejected -- a typo in a
/// setting name should fail loudly, not silently fall back to a
/// default.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub hue: HueSection,
    pub mqtt: MqttSection,
}

/// `[hue]` -- how to reach the hub.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HueSection {
    /// Host (or `host:port`) of the hub's REST API.
    pub ip: String,
    /// Registered application key.
    pub username: SecretString,
    /// Event WebSocket port, if the hub's handshake doesn't advertise one.
    #[serde(default)]
    pub event_port: Option<u16>,
}

/// `[mqtt]` -- broker connection and topic mapping.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttSection {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub enable_auth: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default = "empty_secret")]
    pub password: SecretString,
    #[serde(default)]
    pub enable_tls: bool,
    /// Retain flag on published messages.
    #[serde(default = "default_true")]
    pub messages_retain: bool,
    /// QoS level on published messages (0, 1 or 2).
    #[serde(default = "default_qos")]
    pub messages_qos: u8,
    /// Only publish payloads that differ from the last published value.
    #[serde(default = "default_true")]
    pub messages_cache: bool,
    #[serde(default = "default_prefix")]
    pub topic_prefix: String,
    /// One topic per leaf attribute instead of one JSON body per device.
    #[serde(default)]
    pub topic_distinct: bool,
    /// `"id"`: stable device identifier. `"name"`: lowercased name.
    #[serde(default = "default_scheme")]
    pub topic_scheme: String,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}
fn default_true() -> bool {
    true
}
fn default_qos() -> u8 {
    1
}
fn default_prefix() -> String {
    "hue2mqtt".into()
}
fn default_scheme() -> String {
    "id".into()
}

// ── Loading ─────────────────────────────────────────────────────────

/// Default config file locations, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("hue2mqtt.toml"),
        PathBuf::from("/etc/hue2mqtt.toml"),
    ]
}

/// Load and validate configuration.
///
/// An explicit path must exist; otherwise the default locations are
/// searched. Environment variables override file values, e.g.
/// `HUE2MQTT_MQTT__TOPIC_PREFIX=home/hue`.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = resolve_path(explicit)?;

    let figment = Figment::new()
        .merge(Toml::file(&path))
        .merge(Env::prefixed("HUE2MQTT_").split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::NotFound {
            searched: path.display().to_string(),
        });
    }

    let candidates = config_search_paths();
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Check everything that should stop the process at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.topic_scheme()?;
        self.qos()?;
        self.checked_prefix()?;
        Ok(())
    }

    fn topic_scheme(&self) -> Result<TopicScheme, ConfigError> {
        self.mqtt
            .topic_scheme
            .parse()
            .map_err(|reason| ConfigError::Validation {
                field: "mqtt.topic_scheme",
                reason,
            })
    }

    fn qos(&self) -> Result<QoS, ConfigError> {
        qos_from_level(self.mqtt.messages_qos).ok_or_else(|| ConfigError::Validation {
            field: "mqtt.messages_qos",
            reason: format!("expected 0, 1 or 2, got {}", self.mqtt.messages_qos),
        })
    }

    fn checked_prefix(&self) -> Result<String, ConfigError> {
        let prefix = self.mqtt.topic_prefix.trim_end_matches('/');
        if prefix.is_empty() || prefix.contains(['+', '#']) {
            return Err(ConfigError::Validation {
                field: "mqtt.topic_prefix",
                reason: format!("unusable prefix '{}'", self.mqtt.topic_prefix),
            });
        }
        Ok(prefix.to_owned())
    }

    /// Runtime bridge configuration.
    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let credentials = self.mqtt.enable_auth.then(|| MqttCredentials {
            username: self.mqtt.username.clone(),
            password: self.mqtt.password.clone(),
        });

        Ok(BridgeConfig {
            topics: TopicSettings {
                prefix: self.checked_prefix()?,
                scheme: self.topic_scheme()?,
                distinct: self.mqtt.topic_distinct,
            },
            mqtt: MqttSettings {
                host: self.mqtt.host.clone(),
                port: self.mqtt.port,
                credentials,
                enable_tls: self.mqtt.enable_tls,
                qos: self.qos()?,
                retain: self.mqtt.messages_retain,
                cache: self.mqtt.messages_cache,
                ..MqttSettings::default()
            },
            reconnect: hue2mqtt_api::ReconnectConfig::default(),
        })
    }

    /// Hub connection configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            host: self.hue.ip.clone(),
            api_key: self.hue.username.clone(),
            event_port: self.hue.event_port,
            timeout: DEFAULT_HUB_TIMEOUT,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use hue2mqtt_core::TopicScheme;

    use super::*;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
        [hue]
        ip = "192.168.0.2"
        username = "app-key"

        [mqtt]
        host = "127.0.0.1"
        port = 1883
    "#;

    #[test]
    fn minimal_config_gets_documented_defaults() {
        let file = write_config(MINIMAL);
        let config = load(Some(file.path())).unwrap();

        assert_eq!(config.mqtt.topic_prefix, "hue2mqtt");
        assert_eq!(config.mqtt.messages_qos, 1);
        assert!(config.mqtt.messages_retain);
        assert!(config.mqtt.messages_cache);
        assert!(!config.mqtt.topic_distinct);
        assert_eq!(config.mqtt.topic_scheme, "id");

        let bridge = config.bridge_config().unwrap();
        assert_eq!(bridge.topics.scheme, TopicScheme::Id);
        assert_eq!(bridge.mqtt.qos, QoS::AtLeastOnce);
        assert!(bridge.mqtt.credentials.is_none());
    }

    #[test]
    fn full_config_round_trips() {
        let file = write_config(
            r#"
            [hue]
            ip = "192.168.0.2"
            username = "app-key"
            event_port = 8080

            [mqtt]
            host = "broker.local"
            port = 8883
            enable_auth = true
            username = "bridge"
            password = "hunter2"
            enable_tls = true
            messages_retain = false
            messages_qos = 2
            messages_cache = false
            topic_prefix = "home/hue"
            topic_distinct = true
            topic_scheme = "name"
            "#,
        );
        let config = load(Some(file.path())).unwrap();
        let bridge = config.bridge_config().unwrap();

        assert_eq!(bridge.topics.prefix, "home/hue");
        assert_eq!(bridge.topics.scheme, TopicScheme::Name);
        assert!(bridge.topics.distinct);
        assert_eq!(bridge.mqtt.qos, QoS::ExactlyOnce);
        assert!(!bridge.mqtt.retain);
        assert!(!bridge.mqtt.cache);
        assert!(bridge.mqtt.enable_tls);
        assert_eq!(
            bridge.mqtt.credentials.as_ref().map(|c| c.username.as_str()),
            Some("bridge")
        );

        let hub = config.hub_config();
        assert_eq!(hub.host, "192.168.0.2");
        assert_eq!(hub.event_port, Some(8080));
    }

    #[test]
    fn invalid_scheme_is_a_startup_error() {
        let file = write_config(&MINIMAL.replace(
            "port = 1883",
            "port = 1883\ntopic_scheme = \"friendly\"",
        ));
        let err = load(Some(file.path())).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { field: "mqtt.topic_scheme", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn invalid_qos_is_a_startup_error() {
        let file = write_config(&MINIMAL.replace("port = 1883", "port = 1883\nmessages_qos = 3"));
        let err = load(Some(file.path())).unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { field: "mqtt.messages_qos", .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn wildcard_prefix_is_a_startup_error() {
        let file = write_config(&MINIMAL.replace(
            "port = 1883",
            "port = 1883\ntopic_prefix = \"hue/#\"",
        ));
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config(&MINIMAL.replace("port = 1883", "port = 1883\ntypo_key = true"));
        let err = load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "got {err:?}");
    }

    #[test]
    fn missing_explicit_file_is_reported() {
        let err = load(Some(Path::new("/nonexistent/hue2mqtt.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
