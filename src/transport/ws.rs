use super::{BrokerConnection, BrokerConnector, LinkEvent};
use crate::error::LinkError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Opens broker connections over WebSocket.
///
/// Each connection is pumped by its own task; the task ends when the
/// outbound queue is dropped or the socket closes.
#[derive(Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl BrokerConnector for WsConnector {
    fn open(&mut self, endpoint: &str) -> BrokerConnection {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(endpoint.to_string(), outbound_rx, events_tx));

        BrokerConnection {
            outbound: outbound_tx,
            events: events_rx,
        }
    }
}

async fn pump(
    endpoint: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let _ = events.send(LinkEvent::Error(LinkError::ConnectFailed(e.to_string()).to_string()));
            let _ = events.send(LinkEvent::Closed);
            return;
        }
    };

    info!("Broker connection open");
    if events.send(LinkEvent::Opened).is_err() {
        return;
    }

    let (mut writer, mut reader) = stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = writer.send(Message::Text(text)).await {
                        let _ = events.send(LinkEvent::Error(LinkError::SendFailed(e.to_string()).to_string()));
                        break;
                    }
                }
                None => {
                    // Owner dropped the connection.
                    let _ = writer.close().await;
                    break;
                }
            },
            message = reader.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if events.send(LinkEvent::Frame(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(other)) => debug!("Ignoring non-text broker message: {:?}", other),
                Some(Err(e)) => {
                    warn!("Broker socket error: {}", e);
                    let _ = events.send(LinkEvent::Error(LinkError::ReceiveFailed(e.to_string()).to_string()));
                    break;
                }
            },
        }
    }

    let _ = events.send(LinkEvent::Closed);
    info!("Broker connection closed");
}
