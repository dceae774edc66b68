use super::{BrokerConnection, BrokerConnector, LinkEvent, RequestSink};
use crate::protocol::OutboundRequest;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// In-process broker: every `open` hands the far end of the connection
/// to whoever holds the peer receiver.
#[derive(Debug)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (Self { peers: peers_tx }, peers_rx)
    }
}

impl BrokerConnector for MemoryConnector {
    fn open(&mut self, endpoint: &str) -> BrokerConnection {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            endpoint: endpoint.to_string(),
            frames: outbound_rx,
            events: events_tx,
        };
        if self.peers.send(peer).is_err() {
            debug!("No listener for in-memory connection to {}", endpoint);
        }

        BrokerConnection {
            outbound: outbound_tx,
            events: events_rx,
        }
    }
}

/// Broker side of one in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    pub endpoint: String,
    frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl MemoryPeer {
    /// Each of these returns `false` once the client dropped the connection.
    pub fn accept(&self) -> bool {
        self.events.send(LinkEvent::Opened).is_ok()
    }

    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Frame(text.into())).is_ok()
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.events.send(LinkEvent::Error(reason.into())).is_ok()
    }

    pub fn close(&self) -> bool {
        self.events.send(LinkEvent::Closed).is_ok()
    }

    pub fn is_dropped(&self) -> bool {
        self.events.is_closed()
    }

    /// Frames the client has sent so far.
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }
}

/// Records outbound requests instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn take(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestSink for MemorySink {
    fn dispatch(&self, request: OutboundRequest) {
        debug!("{} <- {:?}", request.path(), request);
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }
    }
}
