// ── MQTT link ──
//
// Broker-facing half of the orchestrator: one task drives the rumqttc
// event loop (connection lifecycle + inbound control messages), one
// task drains the publish queue through the change cache. The two
// tasks share nothing with the hub side except channels, so either
// connection can fail and recover without touching the other.

use std::sync::Arc;

use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, TlsConfiguration, Transport,
};
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hue2mqtt_api::{backoff_delay, ReconnectConfig};

use crate::cache::MessageCache;
use crate::config::{MqttSettings, TopicSettings};
use crate::model::BridgeStatus;
use crate::queue::PublishQueue;
use crate::topic::{self, PublicationKind};

const CLIENT_CHANNEL_CAPACITY: usize = 100;

/// One message received from the broker.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

// ── Client construction ──────────────────────────────────────────────

fn mqtt_options(settings: &MqttSettings, topics: &TopicSettings) -> MqttOptions {
    let mut options = MqttOptions::new(
        settings.client_id.clone(),
        settings.host.clone(),
        settings.port,
    );
    options.set_keep_alive(settings.keep_alive);

    if let Some(credentials) = &settings.credentials {
        options.set_credentials(
            credentials.username.clone(),
            credentials.password.expose_secret(),
        );
    }

    if settings.enable_tls {
        options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca: Vec::new(),
            alpn: None,
            client_auth: None,
        }));
    }

    // The broker reports the bridge offline on an ungraceful death.
    let offline = topic::encode_status(&BridgeStatus::offline(), topics);
    options.set_last_will(LastWill::new(
        offline.topic,
        offline.payload,
        settings.qos,
        settings.retain,
    ));

    options
}

/// Create the broker client and its event loop.
pub fn build_client(settings: &MqttSettings, topics: &TopicSettings) -> (AsyncClient, EventLoop) {
    AsyncClient::new(mqtt_options(settings, topics), CLIENT_CHANNEL_CAPACITY)
}

// ── Event loop task ──────────────────────────────────────────────────

/// Drive the broker connection.
///
/// (Re)subscribes the control-topic filters on every `ConnAck` and
/// forwards inbound publishes to the command path. Connection errors
/// back off and re-poll -- rumqttc reconnects on the next poll.
pub async fn event_loop_task(
    mut event_loop: EventLoop,
    client: AsyncClient,
    topics: TopicSettings,
    settings: MqttSettings,
    inbound_tx: mpsc::Sender<InboundMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = event_loop.poll() => match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    attempt = 0;

                    let filters = [
                        format!("{}/light/+/set", topics.prefix),
                        format!("{}/group/+/set", topics.prefix),
                    ];
                    for filter in filters {
                        if let Err(e) = client.subscribe(filter.clone(), settings.qos).await {
                            warn!(topic = %filter, error = %e, "subscribe request failed");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    if inbound_tx.send(message).await.is_err() {
                        debug!("command channel closed, stopping MQTT event loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, attempt, "MQTT connection error");
                    let delay = backoff_delay(attempt, &reconnect);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    debug!("MQTT event loop exiting");
}

// ── Publisher task ───────────────────────────────────────────────────

/// Drain the publish queue through the change cache.
///
/// Device payloads are deduplicated; status payloads always go out.
/// The cache records a payload once it is handed to the client, which
/// is as close to "published" as QoS 0 gets and matches the configured
/// QoS semantics for 1 and 2 (the event loop handles the acks).
pub async fn publisher_task(
    client: AsyncClient,
    queue: Arc<PublishQueue>,
    mut cache: MessageCache,
    settings: MqttSettings,
    cancel: CancellationToken,
) {
    loop {
        let publication = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            publication = queue.pop() => publication,
        };

        let deduplicated = publication.kind == PublicationKind::Device;
        if deduplicated && !cache.should_publish(&publication.topic, &publication.payload) {
            debug!(topic = %publication.topic, "suppressed unchanged payload");
            continue;
        }

        match client
            .publish(
                publication.topic.clone(),
                settings.qos,
                settings.retain,
                publication.payload.clone(),
            )
            .await
        {
            Ok(()) => {
                if deduplicated {
                    cache.record(&publication.topic, &publication.payload);
                }
            }
            Err(e) => {
                // Request channel gone means the event loop is gone.
                warn!(topic = %publication.topic, error = %e, "publish request failed");
                break;
            }
        }
    }

    debug!("publisher exiting");
}

// ── Shutdown flush ───────────────────────────────────────────────────

/// Best-effort final offline status, bounded so shutdown cannot hang
/// on a dead broker.
pub async fn flush_offline_status(
    client: &AsyncClient,
    topics: &TopicSettings,
    settings: &MqttSettings,
) {
    let offline = topic::encode_status(&BridgeStatus::offline(), topics);
    let publish = client.publish(offline.topic, settings.qos, settings.retain, offline.payload);

    match tokio::time::timeout(std::time::Duration::from_secs(2), publish).await {
        Ok(Ok(())) => debug!("final offline status flushed"),
        Ok(Err(e)) => warn!(error = %e, "final offline status not delivered"),
        Err(_) => warn!("final offline status timed out"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
