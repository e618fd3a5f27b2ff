// ── State reconciler ──
//
// Single writer of the canonical device table. Consumes the hub
// message stream strictly in arrival order: a full snapshot on every
// (re)connect replaces the table wholesale, incremental events merge
// into one device at a time. Each change yields the publication set
// for exactly the devices it touched.
//
// Other components never see the table directly -- the command path
// gets point-in-time identity snapshots through an `ArcSwap` handle.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tracing::{debug, info, warn};

use hue2mqtt_api::{FullState, Handshake, HubEvent};

use crate::config::{TopicScheme, TopicSettings};
use crate::model::{is_virtual_sensor, BridgeStatus, Category, Device};
use crate::topic::{self, Publication};

// ── Messages ─────────────────────────────────────────────────────────

/// Everything the hub connection reports, in arrival order.
#[derive(Debug)]
pub enum HubMessage {
    /// Handshake completed and a full snapshot was fetched.
    Connected {
        handshake: Handshake,
        snapshot: FullState,
    },
    /// One incremental device change.
    Event(HubEvent),
    /// The hub connection dropped.
    Disconnected,
}

// ── Sync state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Syncing,
    Live,
}

// ── Identity index ───────────────────────────────────────────────────

/// Point-in-time map from (category, topic identity) to hub-local id,
/// for resolving inbound control topics. Sensors are read-only and
/// deliberately absent.
#[derive(Debug, Default)]
pub struct DeviceIndex {
    entries: HashMap<(Category, String), String>,
}

impl DeviceIndex {
    pub fn resolve(&self, category: Category, identity: &str) -> Option<&str> {
        self.entries
            .get(&(category, identity.to_owned()))
            .map(String::as_str)
    }

    pub(crate) fn insert(&mut self, category: Category, identity: String, id: String) {
        self.entries.insert((category, identity), id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Reconciler ───────────────────────────────────────────────────────

pub struct Reconciler {
    settings: TopicSettings,
    devices: HashMap<(Category, String), Device>,
    state: SyncState,
    index: Arc<ArcSwap<DeviceIndex>>,
    dropped_events: u64,
    skipped_virtual: u64,
}

impl Reconciler {
    pub fn new(settings: TopicSettings) -> Self {
        Self {
            settings,
            devices: HashMap::new(),
            state: SyncState::Disconnected,
            index: Arc::new(ArcSwap::from_pointee(DeviceIndex::default())),
            dropped_events: 0,
            skipped_virtual: 0,
        }
    }

    /// Shared handle to the identity index for the command path.
    pub fn index_handle(&self) -> Arc<ArcSwap<DeviceIndex>> {
        Arc::clone(&self.index)
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Events dropped for referencing unknown devices or carrying
    /// unusable bodies.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Process one hub message and return the publications it requires.
    pub fn handle(&mut self, message: HubMessage) -> Vec<Publication> {
        match message {
            HubMessage::Connected {
                handshake,
                snapshot,
            } => self.apply_snapshot(&handshake, snapshot),
            HubMessage::Event(event) => self.apply_event(&event),
            HubMessage::Disconnected => self.apply_disconnect(),
        }
    }

    // ── Snapshot path ────────────────────────────────────────────────

    fn apply_snapshot(&mut self, handshake: &Handshake, snapshot: FullState) -> Vec<Publication> {
        self.state = SyncState::Syncing;
        self.devices.clear();

        self.ingest_table(Category::Light, snapshot.lights);
        self.ingest_table(Category::Group, snapshot.groups);
        self.ingest_table(Category::Sensor, snapshot.sensors);

        self.rebuild_index();

        // Status first, then one publication set per device in a
        // deterministic order.
        let mut publications = vec![topic::encode_status(
            &BridgeStatus::online(handshake.bridge.clone()),
            &self.settings,
        )];

        let mut keys: Vec<_> = self.devices.keys().cloned().collect();
        keys.sort();
        for key in keys {
            let device = &self.devices[&key];
            publications.extend(self.encode_device(device));
        }

        self.state = SyncState::Live;
        info!(
            devices = self.devices.len(),
            skipped_virtual = self.skipped_virtual,
            "snapshot applied"
        );
        publications
    }

    fn ingest_table(&mut self, category: Category, table: HashMap<String, Value>) {
        for (id, raw) in table {
            if category == Category::Sensor && is_virtual_sensor(&raw) {
                debug!(%id, "ignoring virtual sensor");
                self.skipped_virtual += 1;
                continue;
            }
            match Device::from_raw(category, &id, &raw) {
                Ok(device) => {
                    self.devices.insert((category, id), device);
                }
                Err(e) => {
                    warn!(%category, %id, error = %e, "unusable device body in snapshot");
                }
            }
        }
    }

    // ── Incremental path ─────────────────────────────────────────────

    fn apply_event(&mut self, event: &HubEvent) -> Vec<Publication> {
        let category = Category::from(event.resource);
        let key = (category, event.id.clone());

        let Some(device) = self.devices.get_mut(&key) else {
            // Unknown ids are routine: virtual sensors are filtered out
            // of the table but still produce events.
            self.dropped_events += 1;
            debug!(%category, id = %event.id, "event for untracked device dropped");
            return Vec::new();
        };

        if let Err(e) = device.apply_change(event.state.as_ref(), event.attr.as_ref()) {
            self.dropped_events += 1;
            warn!(%category, id = %event.id, error = %e, "unusable event body dropped");
            return Vec::new();
        }

        // A rename moves the device's topics under the name scheme.
        if event.attr.is_some() && self.settings.scheme == TopicScheme::Name {
            self.rebuild_index();
        }

        let device = &self.devices[&key];
        self.encode_device(device)
    }

    fn apply_disconnect(&mut self) -> Vec<Publication> {
        self.state = SyncState::Disconnected;
        info!("hub disconnected, canonical state retained");
        vec![topic::encode_status(
            &BridgeStatus::offline(),
            &self.settings,
        )]
    }

    // ── Shared ───────────────────────────────────────────────────────

    fn encode_device(&self, device: &Device) -> Vec<Publication> {
        match topic::encode(device, &self.settings) {
            Ok(publications) => publications,
            Err(e) => {
                warn!(error = %e, "skipping unaddressable device");
                Vec::new()
            }
        }
    }

    fn rebuild_index(&mut self) {
        let mut index = DeviceIndex::default();
        for ((category, id), device) in &self.devices {
            if *category == Category::Sensor {
                continue;
            }
            if let Ok(identity) = topic::identity(device, self.settings.scheme) {
                index.insert(*category, identity, id.clone());
            }
        }
        self.index.store(Arc::new(index));
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use hue2mqtt_api::{BridgeInfo, Resource};

    use crate::topic::PublicationKind;

    use super::*;

    fn handshake() -> Handshake {
        Handshake {
            bridge: BridgeInfo {
                name: "Test Bridge".into(),
                mac_address: "00:11:22:33:44:55".into(),
                api_version: "1.16.0".into(),
            },
            event_port: Some(4443),
        }
    }

    fn snapshot() -> FullState {
        serde_json::from_value(json!({
            "lights": {
                "1": { "name": "Desk", "uniqueid": "aa:01", "state": { "on": true, "bri": 100 } },
                "2": { "name": "Shelf", "uniqueid": "aa:02", "state": { "on": false } }
            },
            "groups": {
                "1": { "name": "Office", "lights": ["1", "2"],
                       "state": { "any_on": true, "all_on": false } }
            },
            "sensors": {
                "1": { "name": "Daylight", "type": "Daylight", "state": { "daylight": true } },
                "5": { "name": "Hall switch", "uniqueid": "bb:05",
                       "productname": "Dimmer switch", "state": { "buttonevent": 1002 } }
            }
        }))
        .unwrap()
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(TopicSettings::default())
    }

    #[test]
    fn snapshot_publishes_status_then_every_device() {
        let mut r = reconciler();
        let pubs = r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        assert_eq!(r.state(), SyncState::Live);
        assert_eq!(pubs[0].topic, "hue2mqtt/status");
        assert_eq!(pubs[0].kind, PublicationKind::Status);
        // 2 lights + 1 group + 1 physical sensor.
        assert_eq!(pubs.len(), 5);
        assert_eq!(r.device_count(), 4);
    }

    #[test]
    fn virtual_sensor_never_reaches_a_topic() {
        let mut r = reconciler();
        let pubs = r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        assert!(!pubs.iter().any(|p| p.payload.contains("Daylight")));

        // Events for the filtered sensor are dropped, not resurrected.
        let dropped = r.handle(HubMessage::Event(HubEvent {
            resource: Resource::Sensors,
            id: "1".into(),
            state: Some(json!({ "daylight": false })),
            attr: None,
        }));
        assert!(dropped.is_empty());
        assert_eq!(r.dropped_events(), 1);
    }

    #[test]
    fn replaying_a_snapshot_is_idempotent() {
        let mut r = reconciler();
        let first = r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });
        let second = r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        assert_eq!(first, second);
        assert_eq!(r.device_count(), 4);
    }

    #[test]
    fn event_merges_and_republishes_one_device() {
        let mut r = reconciler();
        r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        let pubs = r.handle(HubMessage::Event(HubEvent {
            resource: Resource::Lights,
            id: "1".into(),
            state: Some(json!({ "bri": 254 })),
            attr: None,
        }));

        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].topic, "hue2mqtt/light/aa:01");
        let body: Value = serde_json::from_str(&pubs[0].payload).unwrap();
        // Merged: changed key updated, untouched key kept.
        assert_eq!(body["state"], json!({ "on": true, "bri": 254 }));
    }

    #[test]
    fn unknown_device_event_is_counted_not_fatal() {
        let mut r = reconciler();
        r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        let pubs = r.handle(HubMessage::Event(HubEvent {
            resource: Resource::Lights,
            id: "99".into(),
            state: Some(json!({ "on": true })),
            attr: None,
        }));
        assert!(pubs.is_empty());
        assert_eq!(r.dropped_events(), 1);
    }

    #[test]
    fn disconnect_flips_status_offline_and_keeps_state() {
        let mut r = reconciler();
        r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        let pubs = r.handle(HubMessage::Disconnected);
        assert_eq!(r.state(), SyncState::Disconnected);
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].kind, PublicationKind::Status);
        assert_eq!(pubs[0].payload, r#"{"online":false}"#);
        // Last-known-good table survives for the next sync.
        assert_eq!(r.device_count(), 4);
    }

    #[test]
    fn rename_moves_topics_under_name_scheme() {
        let mut r = Reconciler::new(TopicSettings {
            scheme: TopicScheme::Name,
            ..TopicSettings::default()
        });
        r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        let index = r.index_handle();
        assert_eq!(
            index.load().resolve(Category::Light, "desk"),
            Some("1")
        );

        let pubs = r.handle(HubMessage::Event(HubEvent {
            resource: Resource::Lights,
            id: "1".into(),
            state: None,
            attr: Some(json!({ "name": "Standing desk" })),
        }));

        assert_eq!(pubs[0].topic, "hue2mqtt/light/standing desk");
        assert_eq!(index.load().resolve(Category::Light, "desk"), None);
        assert_eq!(
            index.load().resolve(Category::Light, "standing desk"),
            Some("1")
        );
    }

    #[test]
    fn index_excludes_sensors() {
        let mut r = reconciler();
        r.handle(HubMessage::Connected {
            handshake: handshake(),
            snapshot: snapshot(),
        });

        let index = r.index_handle();
        assert_eq!(index.load().resolve(Category::Light, "aa:01"), Some("1"));
        assert_eq!(index.load().resolve(Category::Group, "1"), Some("1"));
        assert_eq!(index.load().resolve(Category::Sensor, "bb:05"), None);
    }
}
