// ── Canonical device model ──
//
// Typed views of the hub's light/group/sensor bodies. Static metadata
// is typed field-by-field; the mutable `state`/`action` trees stay
// dynamic (`serde_json::Value`) because their shape varies per device
// model and partial updates merge into them key-wise.
//
// Serialization mirrors the hub's public field names; absent optionals
// are omitted so published bodies carry no `null` noise.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hue2mqtt_api::Resource;

use super::value;

// ── Category ─────────────────────────────────────────────────────────

/// Device category, one fixed topic segment each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Light,
    Group,
    Sensor,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Group => "group",
            Self::Sensor => "sensor",
        }
    }

    /// Parse a topic segment (`light`, `group`, `sensor`).
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "light" => Some(Self::Light),
            "group" => Some(Self::Group),
            "sensor" => Some(Self::Sensor),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Resource> for Category {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::Lights => Self::Light,
            Resource::Groups => Self::Group,
            Resource::Sensors => Self::Sensor,
        }
    }
}

// ── Per-kind bodies ──────────────────────────────────────────────────

/// A light's public fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueid: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturername: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productname: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swversion: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub swupdate: Value,
}

/// A group's public fields. Groups have no hardware id; their hub-local
/// id is the stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lights: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub group_class: Option<String>,
    /// Aggregate on-state (`all_on` / `any_on`).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub state: Value,
    /// Last action applied to the group's members.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub action: Value,
}

/// A sensor's public fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uniqueid: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturername: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub productname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swversion: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub swupdate: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub state: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub capabilities: Value,
}

/// Hub-internal synthetic sensors (daylight/clock constructs) carry no
/// hardware id and no product name. They never reach the bus.
pub fn is_virtual_sensor(raw: &Value) -> bool {
    raw.get("uniqueid").and_then(Value::as_str).is_none()
        || raw.get("productname").and_then(Value::as_str).is_none()
}

// ── Device ───────────────────────────────────────────────────────────

/// One tracked device. Serializes as the bare per-kind body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Device {
    Light(LightInfo),
    Group(GroupInfo),
    Sensor(SensorInfo),
}

impl Device {
    /// Build a device from a raw hub body keyed by `id`.
    ///
    /// The hub keeps the id outside the body (it is the table key), so
    /// it is injected before deserializing.
    pub fn from_raw(category: Category, id: &str, raw: &Value) -> Result<Self, serde_json::Error> {
        let mut body = raw.clone();
        if let Value::Object(map) = &mut body {
            map.insert("id".into(), Value::String(id.to_owned()));
        }
        Self::from_tree(category, body)
    }

    fn from_tree(category: Category, tree: Value) -> Result<Self, serde_json::Error> {
        match category {
            Category::Light => serde_json::from_value(tree).map(Self::Light),
            Category::Group => serde_json::from_value(tree).map(Self::Group),
            Category::Sensor => serde_json::from_value(tree).map(Self::Sensor),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Light(_) => Category::Light,
            Self::Group(_) => Category::Group,
            Self::Sensor(_) => Category::Sensor,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Light(l) => &l.id,
            Self::Group(g) => &g.id,
            Self::Sensor(s) => &s.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Light(l) => &l.name,
            Self::Group(g) => &g.name,
            Self::Sensor(s) => &s.name,
        }
    }

    /// Stable hardware identifier, when the device has one.
    pub fn uniqueid(&self) -> Option<&str> {
        match self {
            Self::Light(l) => l.uniqueid.as_deref(),
            Self::Sensor(s) => s.uniqueid.as_deref(),
            Self::Group(_) => None,
        }
    }

    pub fn state(&self) -> &Value {
        match self {
            Self::Light(l) => &l.state,
            Self::Group(g) => &g.state,
            Self::Sensor(s) => &s.state,
        }
    }

    /// Merge a partial change into this device.
    ///
    /// `state` patches the state tree key-wise (arrays replace
    /// wholesale); `attr` patches top-level attributes such as `name`.
    pub fn apply_change(
        &mut self,
        state: Option<&Value>,
        attr: Option<&Value>,
    ) -> Result<(), serde_json::Error> {
        let mut tree = serde_json::to_value(&*self)?;

        if let Some(patch) = attr {
            value::merge(&mut tree, patch);
        }
        if let Some(patch) = state {
            if let Value::Object(map) = &mut tree {
                let entry = map
                    .entry("state")
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                value::merge(entry, patch);
            }
        }

        *self = Self::from_tree(self.category(), tree)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
