//! Connection and request seams between the link and the network.
//!
//! A broker connection is a pair of queues: frames to send and events
//! received. Nothing in the link waits on network I/O directly.

pub mod http;
pub mod logging;
pub mod memory;
pub mod ws;

pub use http::HttpSink;
pub use logging::LogSink;
pub use memory::{MemoryConnector, MemoryPeer, MemorySink};
pub use ws::WsConnector;

use crate::protocol::OutboundRequest;
use tokio::sync::mpsc;

/// Something that happened on a broker connection.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// Queue ends of one live broker connection.
///
/// Dropping it closes the connection; pending events are discarded with it.
#[derive(Debug)]
pub struct BrokerConnection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

pub trait BrokerConnector: Send {
    /// Starts opening a connection. Completion is reported as
    /// [`LinkEvent::Opened`], failure as `Error` followed by `Closed`.
    fn open(&mut self, endpoint: &str) -> BrokerConnection;
}

/// Fire-and-forget delivery of outbound HTTP-style requests.
pub trait RequestSink: Send {
    fn dispatch(&self, request: OutboundRequest);
}
