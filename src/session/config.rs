use crate::audio::{default_encodings, CaptureProfile};

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier, embedded in the connection URL
    pub session_id: String,

    /// Scheme and host of the voice service (e.g. "ws://localhost:8000")
    pub ws_base: String,

    /// Microphone constraints
    pub profile: CaptureProfile,

    /// Recorder encodings in order of preference
    pub encodings: Vec<String>,
}

impl SessionConfig {
    /// Config with a fresh session ID
    pub fn new(ws_base: impl Into<String>) -> Self {
        Self {
            ws_base: ws_base.into(),
            ..Self::default()
        }
    }

    /// `<ws_base>/ws/voice/<session_id>`
    pub fn voice_url(&self) -> String {
        format!(
            "{}/ws/voice/{}",
            self.ws_base.trim_end_matches('/'),
            self.session_id
        )
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            ws_base: "ws://localhost:8000".to_string(),
            profile: CaptureProfile::default(),
            encodings: default_encodings(),
        }
    }
}
