// ── Command translator ──
//
// Turns inbound `/set` messages into hub command invocations. Owns no
// state: device identities are resolved against the reconciler's
// point-in-time index, and the resulting command goes straight to the
// hub client. State changes are never applied optimistically -- the
// hub's own event echoes them back through the reconciler.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::config::TopicSettings;
use crate::error::{TopicParseError, TranslationError};
use crate::model::Category;
use crate::reconciler::DeviceIndex;
use crate::topic;

/// Writable light attributes, as the hub's state endpoint accepts them.
pub const LIGHT_ATTRIBUTES: &[&str] = &[
    "on",
    "bri",
    "ct",
    "hue",
    "sat",
    "xy",
    "alert",
    "effect",
    "transitiontime",
    "bri_inc",
    "sat_inc",
    "hue_inc",
    "ct_inc",
    "xy_inc",
];

/// Writable group attributes: everything a light takes, plus scene recall.
pub const GROUP_ATTRIBUTES: &[&str] = &[
    "on",
    "bri",
    "ct",
    "hue",
    "sat",
    "xy",
    "alert",
    "effect",
    "transitiontime",
    "bri_inc",
    "sat_inc",
    "hue_inc",
    "ct_inc",
    "xy_inc",
    "scene",
];

/// One validated hub command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubCommand {
    pub category: Category,
    /// Hub-local device id.
    pub id: String,
    pub attributes: Map<String, Value>,
}

pub struct CommandTranslator {
    settings: TopicSettings,
    index: Arc<ArcSwap<DeviceIndex>>,
}

impl CommandTranslator {
    pub fn new(settings: TopicSettings, index: Arc<ArcSwap<DeviceIndex>>) -> Self {
        Self { settings, index }
    }

    /// Validate one inbound message and produce exactly one command.
    pub fn translate(
        &self,
        topic_path: &str,
        payload: &[u8],
    ) -> Result<HubCommand, TranslationError> {
        let address = topic::decode(topic_path, &self.settings)?;
        if !address.control {
            return Err(TopicParseError::NotAControlTopic {
                topic: topic_path.to_owned(),
            }
            .into());
        }

        // Sensors are read-only; reject before even parsing the payload.
        if address.category == Category::Sensor {
            return Err(TranslationError::Unwritable {
                category: address.category,
            });
        }

        let body: Value =
            serde_json::from_slice(payload).map_err(|e| TranslationError::BadPayload {
                reason: e.to_string(),
            })?;
        let Value::Object(object) = body else {
            return Err(TranslationError::BadPayload {
                reason: "expected a JSON object".into(),
            });
        };
        if object.is_empty() {
            return Err(TranslationError::BadPayload {
                reason: "empty object".into(),
            });
        }

        let allowed = match address.category {
            Category::Light => LIGHT_ATTRIBUTES,
            Category::Group => GROUP_ATTRIBUTES,
            Category::Sensor => unreachable!("rejected above"),
        };

        let mut attributes = Map::new();
        for (key, value) in object {
            if allowed.contains(&key.as_str()) {
                attributes.insert(key, value);
            } else {
                warn!(topic = %topic_path, attribute = %key, "ignoring unrecognized attribute");
            }
        }
        if attributes.is_empty() {
            return Err(TranslationError::BadPayload {
                reason: "no recognized attributes".into(),
            });
        }

        let id = self
            .index
            .load()
            .resolve(address.category, &address.identity)
            .map(str::to_owned)
            .ok_or_else(|| TranslationError::UnknownDevice {
                category: address.category,
                identity: address.identity.clone(),
            })?;

        Ok(HubCommand {
            category: address.category,
            id,
            attributes,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
