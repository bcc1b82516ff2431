//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - The duplex connection to the voice service
//! - Microphone capture and chunk accumulation
//! - Uploading one recording per stop
//! - Dispatching service replies to UI callbacks

mod callbacks;
mod config;
mod error;
mod state;
mod stats;
mod voice;

pub use callbacks::{
    SessionCallbacks, CONNECTION_ERROR, NOT_CONNECTED, PERMISSION_DENIED, START_FAILED,
    STATUS_CONNECTED, STATUS_DISCONNECTED, STATUS_PROCESSING, STATUS_RECORDING,
};
pub use config::SessionConfig;
pub use error::SessionError;
pub use state::{CaptureState, ConnectionState};
pub use stats::SessionStats;
pub use voice::VoiceSession;
