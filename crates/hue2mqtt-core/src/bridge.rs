// ── Bridge orchestrator ──
//
// Owns both connections and wires the data paths without holding any
// translation logic itself:
//
//   hub events ──> reconciler ──> publish queue ──> broker
//   broker /set ──> translator ──> hub commands
//
// The hub and broker lifecycles are supervised independently; neither
// side's recovery waits on the other. Hub events keep updating the
// canonical table while the broker link is down -- the publish queue
// collapses per topic, so reconnection drains current values, not a
// backlog of stale ones.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hue2mqtt_api::{
    backoff_delay, ApiError, EventSocket, HubClient, HubConfig, ReconnectConfig,
};

use crate::cache::MessageCache;
use crate::command::CommandTranslator;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::model::Category;
use crate::mqtt::{self, InboundMessage};
use crate::queue::{PublishQueue, DEFAULT_QUEUE_CAPACITY};
use crate::reconciler::{HubMessage, Reconciler};

const HUB_CHANNEL_CAPACITY: usize = 256;
const INBOUND_CHANNEL_CAPACITY: usize = 64;
/// Event WebSocket port when neither the hub handshake nor the
/// configuration provides one.
const DEFAULT_EVENT_PORT: u16 = 443;

pub struct Bridge {
    config: BridgeConfig,
    hub_config: HubConfig,
}

impl Bridge {
    /// Validate the runtime configuration and build the bridge.
    /// Does not connect -- call [`run()`](Self::run).
    pub fn new(config: BridgeConfig, hub_config: HubConfig) -> Result<Self, BridgeError> {
        let prefix = &config.topics.prefix;
        if prefix.is_empty()
            || prefix.ends_with('/')
            || prefix.contains(['+', '#'])
        {
            return Err(BridgeError::Config {
                message: format!("unusable topic prefix '{prefix}'"),
            });
        }
        Ok(Self { config, hub_config })
    }

    /// Run the bridge until `cancel` fires or the hub rejects the
    /// application key. Flushes a final offline status on the way out.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BridgeError> {
        let hub = HubClient::new(&self.hub_config)?;

        let (hub_tx, hub_rx) = mpsc::channel(HUB_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let queue = Arc::new(PublishQueue::new(DEFAULT_QUEUE_CAPACITY));

        let reconciler = Reconciler::new(self.config.topics.clone());
        let translator =
            CommandTranslator::new(self.config.topics.clone(), reconciler.index_handle());

        let (client, event_loop) = mqtt::build_client(&self.config.mqtt, &self.config.topics);

        // The broker event loop outlives `cancel` by one step: it has
        // to keep pumping while the final offline status is flushed.
        let link_cancel = CancellationToken::new();

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(mqtt::event_loop_task(
            event_loop,
            client.clone(),
            self.config.topics.clone(),
            self.config.mqtt.clone(),
            inbound_tx,
            self.config.reconnect.clone(),
            link_cancel.clone(),
        )));
        tasks.push(tokio::spawn(mqtt::publisher_task(
            client.clone(),
            Arc::clone(&queue),
            MessageCache::new(self.config.mqtt.cache),
            self.config.mqtt.clone(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(reconciler_task(
            hub_rx,
            reconciler,
            Arc::clone(&queue),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(command_task(
            inbound_rx,
            translator,
            hub.clone(),
            cancel.clone(),
        )));
        tasks.push(tokio::spawn(hub_supervisor(
            hub,
            self.hub_config.event_port,
            hub_tx,
            self.config.reconnect.clone(),
            cancel.clone(),
        )));

        cancel.cancelled().await;
        info!("shutting down");

        mqtt::flush_offline_status(&client, &self.config.topics, &self.config.mqtt).await;
        if let Err(e) = client.disconnect().await {
            debug!(error = %e, "broker disconnect request failed");
        }
        link_cancel.cancel();

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }
}

// ── Hub supervision ──────────────────────────────────────────────────

/// Connect to the hub, stream events, reconnect with backoff forever.
///
/// A rejected application key is the one non-recoverable case: it
/// cancels the whole bridge, since every retry would fail identically.
async fn hub_supervisor(
    hub: HubClient,
    fallback_event_port: Option<u16>,
    tx: mpsc::Sender<HubMessage>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        let session = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            session = run_hub_session(&hub, fallback_event_port, &tx, &cancel) => session,
        };

        match session {
            Ok(()) => {
                if cancel.is_cancelled() {
                    break;
                }
                info!("hub connection closed, resyncing");
                attempt = 0;
            }
            Err(e) if e.is_auth_failure() => {
                error!(error = %e, "hub rejected the application key -- register one with --discover");
                cancel.cancel();
                break;
            }
            Err(e) => {
                warn!(error = %e, attempt, "hub connection error");
            }
        }

        let delay = backoff_delay(attempt, &reconnect);
        debug!(delay_ms = delay.as_millis() as u64, attempt, "waiting before hub reconnect");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
    }

    debug!("hub supervisor exiting");
}

/// One hub session: handshake, snapshot, then the event stream until
/// it drops.
///
/// The event socket is opened *before* the snapshot is fetched --
/// changes racing the snapshot queue up in the socket instead of being
/// lost, and the reconciler merges them on top in arrival order.
async fn run_hub_session(
    hub: &HubClient,
    fallback_event_port: Option<u16>,
    tx: &mpsc::Sender<HubMessage>,
    cancel: &CancellationToken,
) -> Result<(), ApiError> {
    let handshake = hub.connect().await?;
    let event_port = handshake
        .event_port
        .or(fallback_event_port)
        .unwrap_or(DEFAULT_EVENT_PORT);

    let mut socket = EventSocket::connect(hub.host(), event_port).await?;
    let snapshot = hub.fetch_snapshot().await?;

    info!(bridge = %handshake.bridge.name, devices = snapshot.device_count(), "hub connected");
    if tx
        .send(HubMessage::Connected {
            handshake,
            snapshot,
        })
        .await
        .is_err()
    {
        return Ok(());
    }

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            event = socket.next_event() => match event {
                Ok(Some(event)) => {
                    if tx.send(HubMessage::Event(event)).await.is_err() {
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        }
    };

    // The reconciler owns the offline transition; on process shutdown
    // the final status flush covers it instead.
    if !cancel.is_cancelled() {
        let _ = tx.send(HubMessage::Disconnected).await;
    }
    result
}

// ── Core tasks ───────────────────────────────────────────────────────

/// Apply hub messages strictly in arrival order and queue the
/// resulting publications.
async fn reconciler_task(
    mut hub_rx: mpsc::Receiver<HubMessage>,
    mut reconciler: Reconciler,
    queue: Arc<PublishQueue>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = hub_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        for publication in reconciler.handle(message) {
            queue.push(publication);
        }
    }

    debug!(
        dropped_events = reconciler.dropped_events(),
        "reconciler exiting"
    );
}

/// Translate inbound control messages and submit hub commands, one at
/// a time in broker-delivery order.
async fn command_task(
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    translator: CommandTranslator,
    hub: HubClient,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = inbound_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let command = match translator.translate(&message.topic, &message.payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropped control message");
                continue;
            }
        };

        debug!(category = %command.category, id = %command.id, "submitting hub command");
        let result = match command.category {
            Category::Light => hub.set_light_state(&command.id, &command.attributes).await,
            Category::Group => hub.set_group_action(&command.id, &command.attributes).await,
            Category::Sensor => continue,
        };

        // Diagnostic only -- retry policy belongs to the operator, and
        // canonical state is untouched until the hub echoes the change.
        if let Err(e) = result {
            warn!(category = %command.category, id = %command.id, error = %e, "hub rejected command");
        }
    }

    debug!("command task exiting");
}
