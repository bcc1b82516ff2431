//! Duplex connection to the voice service
//!
//! - `connection`: transport traits and the event sink handed to transports
//! - `websocket`: tokio-tungstenite implementation
//! - `messages`: inbound JSON message model

pub mod connection;
pub mod messages;
pub mod websocket;

pub use connection::{Connection, ConnectionEvents, Transport, TransportError, TransportEvent};
pub use messages::{InboundMessage, VoiceResponse};
pub use websocket::WsTransport;
