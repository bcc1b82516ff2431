use serde_json::Value;
use std::fmt;

pub const STATUS_CONNECTED: &str = "Connected";
pub const STATUS_DISCONNECTED: &str = "Disconnected";
pub const STATUS_RECORDING: &str = "Recording…";
pub const STATUS_PROCESSING: &str = "Processing…";

pub const PERMISSION_DENIED: &str = "Microphone access denied. Please allow microphone access.";
pub const CONNECTION_ERROR: &str = "WebSocket connection error";
pub const NOT_CONNECTED: &str = "WebSocket not connected";
/// Prefix for any other failure while starting a recording
pub const START_FAILED: &str = "Failed to start recording: ";

type TextHandler = Box<dyn Fn(&str) + Send + Sync>;
type PayloadHandler = Box<dyn Fn(&Value) + Send + Sync>;
type SignalHandler = Box<dyn Fn() + Send + Sync>;

/// Handlers the UI registers on a session. All are optional.
#[derive(Default)]
pub struct SessionCallbacks {
    pub on_status_change: Option<TextHandler>,
    pub on_transcript: Option<TextHandler>,
    pub on_response: Option<PayloadHandler>,
    pub on_error: Option<TextHandler>,
    pub on_recording_start: Option<SignalHandler>,
    pub on_recording_stop: Option<SignalHandler>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status_change(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_status_change = Some(Box::new(f));
        self
    }

    pub fn on_transcript(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_transcript = Some(Box::new(f));
        self
    }

    pub fn on_response(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_response = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_recording_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_recording_start = Some(Box::new(f));
        self
    }

    pub fn on_recording_stop(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_recording_stop = Some(Box::new(f));
        self
    }

    pub(crate) fn status(&self, text: &str) {
        if let Some(f) = &self.on_status_change {
            f(text);
        }
    }

    pub(crate) fn transcript(&self, text: &str) {
        if let Some(f) = &self.on_transcript {
            f(text);
        }
    }

    pub(crate) fn response(&self, payload: &Value) {
        if let Some(f) = &self.on_response {
            f(payload);
        }
    }

    pub(crate) fn error(&self, message: &str) {
        if let Some(f) = &self.on_error {
            f(message);
        }
    }

    pub(crate) fn recording_started(&self) {
        if let Some(f) = &self.on_recording_start {
            f();
        }
    }

    pub(crate) fn recording_stopped(&self) {
        if let Some(f) = &self.on_recording_stop {
            f();
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_status_change", &self.on_status_change.is_some())
            .field("on_transcript", &self.on_transcript.is_some())
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_recording_start", &self.on_recording_start.is_some())
            .field("on_recording_stop", &self.on_recording_stop.is_some())
            .finish()
    }
}
