pub mod audio;
pub mod config;
pub mod session;
pub mod transport;

pub use audio::{
    play_audio_base64, AudioPlayer, AudioRecorder, CaptureBackend, CaptureError, CaptureProfile,
    CommandPlayer, FileCapture, MediaStream,
};
pub use config::Config;
pub use session::{
    CaptureState, ConnectionState, SessionCallbacks, SessionConfig, SessionError, SessionStats,
    VoiceSession,
};
pub use transport::{
    Connection, ConnectionEvents, InboundMessage, Transport, TransportError, TransportEvent,
    VoiceResponse, WsTransport,
};
