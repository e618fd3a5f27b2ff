// ── Topic codec ──
//
// Pure mapping between devices and the topic namespace. No I/O: the
// encoder turns one device into the ordered publication set its
// configuration calls for, the decoder turns an inbound topic path
// back into a device address.
//
// Topic shape:
//   <prefix>/<category>/<identity>                 one JSON body per device
//   <prefix>/<category>/<identity>/state/<attr>    distinct mode, per leaf
//   <prefix>/<category>/<identity>/set             control direction

use crate::config::{TopicScheme, TopicSettings};
use crate::error::{AddressingError, TopicParseError};
use crate::model::{value, BridgeStatus, Category, Device};

// ── Publication ──────────────────────────────────────────────────────

/// What a publication is allowed to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationKind {
    /// Device payload; deduplicated by the change cache.
    Device,
    /// Status heartbeat; always emitted, never deduplicated.
    Status,
}

/// One `(topic, payload)` pair ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub kind: PublicationKind,
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Topic identity segment for a device under the configured scheme.
///
/// Groups carry no hardware id, so their hub-local id is the stable
/// identity. Names are lowercased; a device with neither identity is
/// unaddressable.
pub fn identity(device: &Device, scheme: TopicScheme) -> Result<String, AddressingError> {
    let identity = match scheme {
        TopicScheme::Id => match device {
            Device::Group(group) => Some(group.id.clone()),
            _ => device.uniqueid().map(str::to_owned),
        },
        TopicScheme::Name => {
            let name = device.name().trim().to_lowercase();
            (!name.is_empty()).then_some(name)
        }
    };

    identity.ok_or_else(|| AddressingError {
        category: device.category(),
        id: device.id().to_owned(),
        scheme: scheme.as_str(),
    })
}

/// Encode one device into its ordered publication set.
pub fn encode(
    device: &Device,
    settings: &TopicSettings,
) -> Result<Vec<Publication>, AddressingError> {
    let identity = identity(device, settings.scheme)?;
    let base = format!(
        "{}/{}/{}",
        settings.prefix,
        device.category().as_str(),
        identity
    );

    let body = serde_json::to_value(device).expect("device bodies serialize to JSON");

    if settings.distinct {
        let publications = value::flatten(&body)
            .into_iter()
            .map(|(path, leaf)| Publication {
                topic: if path.is_empty() {
                    base.clone()
                } else {
                    format!("{base}/{path}")
                },
                payload: leaf.to_string(),
                kind: PublicationKind::Device,
            })
            .collect();
        Ok(publications)
    } else {
        Ok(vec![Publication {
            topic: base,
            payload: body.to_string(),
            kind: PublicationKind::Device,
        }])
    }
}

/// Build the status publication for the configured prefix.
pub fn encode_status(status: &BridgeStatus, settings: &TopicSettings) -> Publication {
    Publication {
        topic: settings.status_topic(),
        payload: serde_json::to_string(status).expect("status bodies serialize to JSON"),
        kind: PublicationKind::Status,
    }
}

// ── Decoding ─────────────────────────────────────────────────────────

/// A decoded topic path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAddress {
    pub category: Category,
    pub identity: String,
    /// Leaf attribute path for distinct-mode state topics.
    pub attribute_path: Option<String>,
    /// `true` for `/set` control topics.
    pub control: bool,
}

/// Decode a topic path back into a device address.
pub fn decode(topic: &str, settings: &TopicSettings) -> Result<TopicAddress, TopicParseError> {
    let rest = topic
        .strip_prefix(&settings.prefix)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| TopicParseError::WrongPrefix {
            topic: topic.to_owned(),
        })?;

    let mut segments: Vec<&str> = rest.split('/').collect();

    let control = segments.last() == Some(&"set");
    if control {
        segments.pop();
    }

    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(TopicParseError::SegmentCount {
            topic: topic.to_owned(),
            got: segments.len(),
            expected: 2,
        });
    }

    let category = Category::from_segment(segments[0]).ok_or_else(|| {
        TopicParseError::UnknownCategory {
            segment: segments[0].to_owned(),
        }
    })?;

    // Control topics address a whole device, never a single attribute.
    if control && segments.len() != 2 {
        return Err(TopicParseError::SegmentCount {
            topic: topic.to_owned(),
            got: segments.len(),
            expected: 2,
        });
    }

    let attribute_path = (segments.len() > 2).then(|| segments[2..].join("/"));

    Ok(TopicAddress {
        category,
        identity: segments[1].to_owned(),
        attribute_path,
        control,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;

    fn settings(scheme: TopicScheme, distinct: bool) -> TopicSettings {
        TopicSettings {
            prefix: "hue2mqtt".into(),
            scheme,
            distinct,
        }
    }

    fn light(state: Value) -> Device {
        Device::from_raw(
            Category::Light,
            "3",
            &json!({
                "name": "Desk Lamp",
                "uniqueid": "00:17:88:01:02:03-0b",
                "state": state
            }),
        )
        .unwrap()
    }

    #[test]
    fn id_scheme_uses_hardware_identifier() {
        let pubs = encode(&light(json!({"on": true})), &settings(TopicScheme::Id, false)).unwrap();
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].topic, "hue2mqtt/light/00:17:88:01:02:03-0b");
        assert_eq!(pubs[0].kind, PublicationKind::Device);
    }

    #[test]
    fn name_scheme_lowercases() {
        let pubs = encode(&light(json!({})), &settings(TopicScheme::Name, false)).unwrap();
        assert_eq!(pubs[0].topic, "hue2mqtt/light/desk lamp");
    }

    #[test]
    fn group_identity_is_hub_local_id() {
        let group = Device::from_raw(
            Category::Group,
            "4",
            &json!({ "name": "Office", "lights": ["1", "3"] }),
        )
        .unwrap();
        let pubs = encode(&group, &settings(TopicScheme::Id, false)).unwrap();
        assert_eq!(pubs[0].topic, "hue2mqtt/group/4");
    }

    #[test]
    fn sensor_without_identity_is_unaddressable() {
        let sensor = Device::from_raw(Category::Sensor, "9", &json!({ "name": "" })).unwrap();
        let err = identity(&sensor, TopicScheme::Id).unwrap_err();
        assert_eq!(err.category, Category::Sensor);
        assert!(identity(&sensor, TopicScheme::Name).is_err());
    }

    #[test]
    fn full_body_mode_publishes_one_json_object() {
        let pubs = encode(
            &light(json!({"on": false, "bri": 153})),
            &settings(TopicScheme::Id, false),
        )
        .unwrap();
        let body: Value = serde_json::from_str(&pubs[0].payload).unwrap();
        assert_eq!(body["state"], json!({"on": false, "bri": 153}));
        assert_eq!(body["name"], "Desk Lamp");
    }

    #[test]
    fn distinct_mode_publishes_one_topic_per_leaf() {
        let pubs = encode(
            &light(json!({"on": false, "bri": 153})),
            &settings(TopicScheme::Id, true),
        )
        .unwrap();

        let find = |suffix: &str| {
            pubs.iter()
                .find(|p| p.topic.ends_with(suffix))
                .unwrap_or_else(|| panic!("no topic ending in {suffix}"))
        };
        assert_eq!(
            find("/state/on").topic,
            "hue2mqtt/light/00:17:88:01:02:03-0b/state/on"
        );
        assert_eq!(find("/state/on").payload, "false");
        assert_eq!(find("/state/bri").payload, "153");
    }

    #[test]
    fn distinct_mode_keeps_coordinate_pairs_opaque() {
        let pubs = encode(
            &light(json!({"xy": [0.4, 0.2]})),
            &settings(TopicScheme::Id, true),
        )
        .unwrap();
        let xy = pubs.iter().find(|p| p.topic.ends_with("/state/xy")).unwrap();
        assert_eq!(xy.payload, "[0.4,0.2]");
        assert!(!pubs.iter().any(|p| p.topic.ends_with("/state/xy/0")));
    }

    #[test]
    fn encode_then_decode_recovers_the_address() {
        let device = light(json!({"on": true}));
        let settings = settings(TopicScheme::Id, false);
        let pubs = encode(&device, &settings).unwrap();

        let address = decode(&pubs[0].topic, &settings).unwrap();
        assert_eq!(address.category, Category::Light);
        assert_eq!(address.identity, "00:17:88:01:02:03-0b");
        assert_eq!(address.attribute_path, None);
        assert!(!address.control);
    }

    #[test]
    fn decode_control_topic() {
        let address = decode("hue2mqtt/light/3/set", &settings(TopicScheme::Id, false)).unwrap();
        assert_eq!(address.category, Category::Light);
        assert_eq!(address.identity, "3");
        assert!(address.control);
    }

    #[test]
    fn decode_rejects_malformed_paths() {
        let s = settings(TopicScheme::Id, false);
        assert!(matches!(
            decode("other/light/3/set", &s),
            Err(TopicParseError::WrongPrefix { .. })
        ));
        assert!(matches!(
            decode("hue2mqtt/lamp/3/set", &s),
            Err(TopicParseError::UnknownCategory { .. })
        ));
        assert!(matches!(
            decode("hue2mqtt/light", &s),
            Err(TopicParseError::SegmentCount { .. })
        ));
        assert!(matches!(
            decode("hue2mqtt/light/3/state/on/set", &s),
            Err(TopicParseError::SegmentCount { .. })
        ));
    }

    #[test]
    fn decode_distinct_state_topic_keeps_attribute_path() {
        let s = settings(TopicScheme::Id, true);
        let address = decode("hue2mqtt/sensor/00:aa/state/buttonevent", &s).unwrap();
        assert_eq!(address.category, Category::Sensor);
        assert_eq!(address.attribute_path.as_deref(), Some("state/buttonevent"));
        assert!(!address.control);
    }
}
