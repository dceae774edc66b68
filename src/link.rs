use crate::config::LinkConfig;
use crate::device::{DeviceChannel, DeviceRegistry, DeviceState, EntityId};
use crate::protocol::{
    websocket_endpoint, OutboundRequest, ProtocolHandler, RpcCommand, SubscribeFrame, SubscriptionId,
};
use crate::transport::{BrokerConnection, BrokerConnector, LinkEvent, RequestSink};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LinkStats {
    pub connects: u32,
    pub subscribe_frames_sent: u32,
    pub frames_applied: u64,
    pub frames_discarded: u64,
    pub frames_malformed: u64,
    pub requests_dispatched: u64,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Applied(DeviceChannel),
    Discarded,
    Malformed,
}

/// Single logical connection to the telemetry broker.
///
/// Owns the device registry: inbound frames are demultiplexed by
/// subscription id into per-channel state, and outbound requests are
/// addressed by each channel's entity id.
pub struct TelemetryLink {
    ws_url: String,
    token: String,
    registry: DeviceRegistry,
    protocol: ProtocolHandler,
    connector: Box<dyn BrokerConnector>,
    sink: Box<dyn RequestSink>,
    connection: Option<BrokerConnection>,
    open: bool,
    subscriptions: HashMap<SubscriptionId, DeviceChannel>,
    next_subscription_id: Option<SubscriptionId>,
    stats: LinkStats,
}

impl TelemetryLink {
    pub fn new(config: &LinkConfig, connector: Box<dyn BrokerConnector>, sink: Box<dyn RequestSink>) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            token: config.token.clone(),
            registry: DeviceRegistry::new(config.entity_ids.clone()),
            protocol: ProtocolHandler::new(),
            connector,
            sink,
            connection: None,
            open: false,
            subscriptions: HashMap::new(),
            next_subscription_id: Some(SubscriptionId::FIRST),
            stats: LinkStats::default(),
        }
    }

    /// Opens a fresh connection, tearing down any existing one first.
    ///
    /// Subscriptions are sent once the connection reports it is open.
    pub fn connect(&mut self) {
        if self.connection.is_some() {
            self.close();
        }

        self.subscriptions.clear();
        self.next_subscription_id = Some(SubscriptionId::FIRST);

        info!("Connecting to broker at {}", self.ws_url);
        let endpoint = websocket_endpoint(&self.ws_url, &self.token);
        self.connection = Some(self.connector.open(&endpoint));
        self.open = false;
        self.stats.connects += 1;
    }

    /// Subscribes every configured channel, in channel order.
    pub fn subscribe_all(&mut self) {
        if self.connection.is_none() {
            debug!("subscribe_all without a connection");
            return;
        }

        let targets: Vec<(DeviceChannel, EntityId)> = self
            .registry
            .configured()
            .map(|(channel, entity_id)| (channel, entity_id.clone()))
            .collect();

        for (channel, entity_id) in targets {
            let Some(subscription_id) = self.next_subscription_id else {
                warn!("Subscription ids exhausted; {} not subscribed", channel);
                break;
            };
            self.next_subscription_id = subscription_id.next();

            self.subscriptions.insert(subscription_id, channel);
            self.registry.state_mut(channel).connected = true;

            let frame = SubscribeFrame::latest_telemetry(entity_id, subscription_id);
            let text = match self.protocol.serialize_subscribe(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode subscription for {}: {}", channel, e);
                    continue;
                }
            };

            debug!("Subscribing {} as {}", channel, subscription_id);
            if let Some(connection) = &self.connection {
                if connection.outbound.send(text).is_err() {
                    warn!("Broker connection gone while subscribing {}", channel);
                }
            }
            self.stats.subscribe_frames_sent += 1;
        }
    }

    /// Applies one event from the current connection.
    pub fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => {
                self.open = true;
                self.subscribe_all();
            }
            LinkEvent::Frame(text) => {
                self.handle_frame(&text);
            }
            LinkEvent::Error(reason) => {
                warn!("Broker transport error: {}", reason);
            }
            LinkEvent::Closed => {
                info!("Broker connection closed");
                self.close();
            }
        }
    }

    /// Demultiplexes one inbound frame into its channel's state.
    pub fn handle_frame(&mut self, text: &str) -> FrameOutcome {
        let frame = match self.protocol.parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping inbound frame: {}", e);
                self.stats.frames_malformed += 1;
                return FrameOutcome::Malformed;
            }
        };

        let channel = frame
            .subscription_id
            .and_then(|id| self.subscriptions.get(&id).copied());

        match (channel, frame.data.is_some()) {
            (Some(channel), true) => {
                let values = frame.latest_values();
                self.registry.state_mut(channel).merge(values);
                self.stats.frames_applied += 1;
                FrameOutcome::Applied(channel)
            }
            _ => {
                debug!("Discarding frame for subscription {:?}", frame.subscription_id);
                self.stats.frames_discarded += 1;
                FrameOutcome::Discarded
            }
        }
    }

    /// Waits for the next event on the current connection.
    ///
    /// Never resolves while disconnected. A connection whose event queue
    /// ended is reported as closed.
    pub async fn next_event(&mut self) -> LinkEvent {
        match self.connection.as_mut() {
            Some(connection) => connection.events.recv().await.unwrap_or(LinkEvent::Closed),
            None => std::future::pending().await,
        }
    }

    /// Handles every event already queued, without waiting.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let Some(connection) = self.connection.as_mut() else {
                return handled;
            };
            let event = match connection.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return handled,
                Err(TryRecvError::Disconnected) => LinkEvent::Closed,
            };
            self.handle_event(event);
            handled += 1;
        }
    }

    /// Drops the connection and invalidates every subscription id.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!("Dropping broker connection");
        }
        self.open = false;
        self.registry.mark_all_disconnected();
        self.subscriptions.clear();
    }

    /// Fire-and-forget device command; skipped unless connected.
    pub fn publish_command(&mut self, channel: DeviceChannel, params: Map<String, Value>) {
        if !self.is_connected() {
            debug!("Not connected; dropping command for {}", channel);
            return;
        }
        let Some(entity_id) = self.registry.entity_id(channel).cloned() else {
            debug!("No entity configured for {}; dropping command", channel);
            return;
        };

        self.sink.dispatch(OutboundRequest::Command {
            entity_id,
            body: RpcCommand::set_device_state(params),
        });
        self.stats.requests_dispatched += 1;
    }

    /// Fire-and-forget telemetry; independent of the broker connection.
    pub fn publish_telemetry(&mut self, channel: DeviceChannel, payload: Map<String, Value>) {
        let Some(entity_id) = self.registry.entity_id(channel).cloned() else {
            debug!("No entity configured for {}; dropping telemetry", channel);
            return;
        };

        self.sink.dispatch(OutboundRequest::Telemetry { entity_id, payload });
        self.stats.requests_dispatched += 1;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.open
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub fn channel_for(&self, subscription_id: SubscriptionId) -> Option<DeviceChannel> {
        self.subscriptions.get(&subscription_id).copied()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn device_state(&self, channel: DeviceChannel) -> &DeviceState {
        self.registry.state(channel)
    }

    pub fn devices(&self) -> &BTreeMap<DeviceChannel, DeviceState> {
        self.registry.states()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn get_stats(&self) -> &LinkStats {
        &self.stats
    }
}
