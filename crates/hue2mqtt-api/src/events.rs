//! Push-event WebSocket stream.
//!
//! The hub advertises an event WebSocket in its `/config` handshake.
//! Every frame is a small JSON document describing a partial change to
//! one device, e.g.:
//!
//! ```json
//! {"t": "event", "e": "changed", "r": "lights", "id": "3", "state": {"on": true}}
//! ```
//!
//! [`EventSocket`] wraps a single connection and yields parsed
//! [`HubEvent`]s. Reconnection policy lives with the caller -- the
//! bridge re-runs its handshake + snapshot on every reconnect, so a
//! self-healing socket would hide exactly the transition it needs to
//! observe. [`ReconnectConfig`] and [`backoff_delay`] provide the
//! shared backoff schedule.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::ApiError;
use crate::types::{HubEvent, Resource};

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection loops.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff with deterministic jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// The jitter is seeded from the attempt number, which is enough to
/// spread reconnection storms from multiple bridge instances.
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(attempt.min(16) as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── EventSocket ──────────────────────────────────────────────────────

/// A single connection to the hub's event WebSocket.
pub struct EventSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl EventSocket {
    /// Connect to the event WebSocket at `ws://<host>:<port>/`.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ApiError> {
        let url = Url::parse(&format!("ws://{host}:{port}/"))?;
        debug!(url = %url, "connecting to event socket");

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ApiError::WebSocketConnect(e.to_string()))?;

        debug!("event socket connected");
        Ok(Self { stream })
    }

    /// Read frames until the next device event.
    ///
    /// Returns `Ok(None)` when the hub closes the connection cleanly.
    /// Frames that are not device change events (scene updates, added /
    /// deleted announcements, pings) are skipped -- the periodic
    /// snapshot on reconnect covers device additions and removals.
    pub async fn next_event(&mut self) -> Result<Option<HubEvent>, ApiError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_frame(&text) {
                        return Ok(Some(event));
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite answers pongs automatically
                    trace!("event socket ping");
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(cf) = frame {
                        debug!(code = %cf.code, reason = %cf.reason, "event socket close frame");
                    }
                    return Ok(None);
                }
                Some(Ok(_)) => {
                    // Binary, Pong, Frame -- ignore
                }
                Some(Err(e)) => {
                    return Err(ApiError::WebSocketConnect(e.to_string()));
                }
                None => {
                    debug!("event socket stream ended");
                    return Ok(None);
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Raw frame envelope. Field names follow the hub's wire format.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "t")]
    frame_type: String,
    #[serde(rename = "e", default)]
    event_kind: Option<String>,
    #[serde(rename = "r", default)]
    resource: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    state: Option<serde_json::Value>,
    #[serde(default)]
    attr: Option<serde_json::Value>,
}

/// Parse one text frame into a [`HubEvent`], or `None` for frames the
/// bridge does not consume.
fn parse_frame(text: &str) -> Option<HubEvent> {
    let frame: RawFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            debug!(error = %e, "unparseable event frame, skipping");
            return None;
        }
    };

    if frame.frame_type != "event" || frame.event_kind.as_deref() != Some("changed") {
        trace!(frame_type = %frame.frame_type, "non-change frame, skipping");
        return None;
    }

    let resource = match frame.resource.as_deref() {
        Some("lights") => Resource::Lights,
        Some("groups") => Resource::Groups,
        Some("sensors") => Resource::Sensors,
        other => {
            trace!(resource = ?other, "event for unbridged resource, skipping");
            return None;
        }
    };

    let id = frame.id?;
    if frame.state.is_none() && frame.attr.is_none() {
        return None;
    }

    Some(HubEvent {
        resource,
        id,
        state: frame.state,
        attr: frame.attr,
    })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_state_change_frame() {
        let text = r#"{"t":"event","e":"changed","r":"lights","id":"3","state":{"on":true,"bri":200}}"#;
        let event = parse_frame(text).unwrap();
        assert_eq!(event.resource, Resource::Lights);
        assert_eq!(event.id, "3");
        assert_eq!(event.state.unwrap()["bri"], 200);
        assert!(event.attr.is_none());
    }

    #[test]
    fn parse_attr_change_frame() {
        let text = r#"{"t":"event","e":"changed","r":"sensors","id":"7","attr":{"name":"Hall switch"}}"#;
        let event = parse_frame(text).unwrap();
        assert_eq!(event.resource, Resource::Sensors);
        assert_eq!(event.attr.unwrap()["name"], "Hall switch");
    }

    #[test]
    fn skip_added_and_deleted_frames() {
        let added = r#"{"t":"event","e":"added","r":"lights","id":"9","light":{}}"#;
        let deleted = r#"{"t":"event","e":"deleted","r":"lights","id":"9"}"#;
        assert!(parse_frame(added).is_none());
        assert!(parse_frame(deleted).is_none());
    }

    #[test]
    fn skip_unbridged_resources_and_garbage() {
        let scene = r#"{"t":"event","e":"changed","r":"scenes","id":"1","attr":{}}"#;
        assert!(parse_frame(scene).is_none());
        assert!(parse_frame("not json").is_none());
        assert!(parse_frame(r#"{"t":"event","e":"changed","r":"lights","id":"1"}"#).is_none());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        let d0 = backoff_delay(0, &config);
        let d1 = backoff_delay(1, &config);
        assert!(d1 > d0, "expected growth: {d0:?} -> {d1:?}");

        // With +-25% jitter on a 30s cap, nothing should exceed 37.5s.
        for attempt in 0..40 {
            assert!(backoff_delay(attempt, &config) <= Duration::from_secs_f64(37.5));
        }
    }

    #[test]
    fn backoff_handles_large_attempt_counts() {
        let config = ReconnectConfig::default();
        // 2^attempt must not overflow to infinity for long outages.
        let d = backoff_delay(u32::MAX, &config);
        assert!(d <= Duration::from_secs_f64(37.5));
    }
}
