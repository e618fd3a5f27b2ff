// hue2mqtt-api: Async Rust client for Hue-compatible hubs (REST + WebSocket events)

pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::{HubClient, HubConfig};
pub use error::ApiError;
pub use events::{backoff_delay, EventSocket, ReconnectConfig};
pub use types::{BridgeInfo, FullState, Handshake, HubEvent, Resource};
