use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ConnectionEvents, Transport, TransportError};

enum Outbound {
    Binary(Bytes),
    Close,
}

/// WebSocket transport backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn connect(&self, url: &str, events: ConnectionEvents) -> Box<dyn Connection> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(url.to_string(), outbound_rx, events));

        Box::new(WsConnection {
            outbound: outbound_tx,
            task,
        })
    }
}

struct WsConnection {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl Connection for WsConnection {
    fn send_binary(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Binary(payload))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if self.outbound.send(Outbound::Close).is_err() {
            self.task.abort();
        }
    }
}

async fn run_connection(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: ConnectionEvents,
) {
    let id = events.connection_id();
    info!("Connection {}: connecting to {}", id, url);

    // Anything queued before the handshake completes means the owner gave up
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = outbound.recv() => {
            info!("Connection {}: attempt abandoned", id);
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            error!("Connection {}: failed to connect to {}: {}", id, url, e);
            events.error(e.to_string());
            events.closed();
            return;
        }
    };

    info!("Connection {}: connected to {}", id, url);
    events.opened();

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Binary(payload)) => {
                    let len = payload.len();
                    if let Err(e) = ws_sink.send(Message::Binary(payload)).await {
                        error!("Failed to send audio: {}", e);
                        events.error(e.to_string());
                        break;
                    }
                    debug!("Sent {} bytes of audio", len);
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    info!("Connection {}: closed by client", id);
                    break;
                }
            },

            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    debug!("Received text frame ({} bytes)", text.len());
                    events.text(text.to_string());
                }
                Some(Ok(Message::Binary(data))) => events.binary(data),
                Some(Ok(Message::Close(frame))) => {
                    info!("Connection {}: closed by server: {:?}", id, frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    events.error(e.to_string());
                    break;
                }
                None => {
                    info!("WebSocket stream ended");
                    break;
                }
            },
        }
    }

    events.closed();
}
