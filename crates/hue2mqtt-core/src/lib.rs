// hue2mqtt-core: bridge core -- device model, topic codec, state
// reconciliation, command translation, and the orchestrator that wires
// them to the hub and broker connections.

pub mod bridge;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod mqtt;
pub mod queue;
pub mod reconciler;
pub mod topic;

pub use rumqttc::QoS;

pub use bridge::Bridge;
pub use cache::MessageCache;
pub use command::{CommandTranslator, HubCommand};
pub use config::{
    qos_from_level, BridgeConfig, MqttCredentials, MqttSettings, TopicScheme, TopicSettings,
};
pub use error::{AddressingError, BridgeError, TopicParseError, TranslationError};
pub use model::{BridgeStatus, Category, Device};
pub use queue::PublishQueue;
pub use reconciler::{HubMessage, Reconciler, SyncState};
pub use topic::{Publication, PublicationKind};
