use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// Lifecycle and data events of one duplex connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished; the connection is ready to send
    Opened,
    Text(String),
    Binary(Bytes),
    /// Connection-level failure; usually followed by `Closed`
    Error(String),
    Closed,
}

/// Where a transport reports what happens on a connection.
///
/// Every event is tagged with the id the session assigned to the attempt, so
/// events from an abandoned connection can be told apart from the live one.
#[derive(Debug, Clone)]
pub struct ConnectionEvents {
    connection_id: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl ConnectionEvents {
    pub fn new(connection_id: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { connection_id, tx }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Deliver an event. Events sent after the session is gone are dropped.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send((self.connection_id, event));
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn text(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Text(text.into()));
    }

    pub fn binary(&self, data: Bytes) {
        self.emit(TransportEvent::Binary(data));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into()));
    }

    pub fn closed(&self) {
        self.emit(TransportEvent::Closed);
    }
}

/// Opens duplex connections.
///
/// `connect` must not block: it starts the attempt and returns a handle at
/// once. Progress (open, messages, error, close) arrives through `events`.
pub trait Transport: Send + Sync {
    fn connect(&self, url: &str, events: ConnectionEvents) -> Box<dyn Connection>;
}

/// Handle to one connection attempt
pub trait Connection: Send {
    /// Queue a binary frame
    fn send_binary(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Close the connection, or abandon the attempt if it is still opening
    fn close(&mut self);
}
