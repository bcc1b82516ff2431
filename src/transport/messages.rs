use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message received from the voice service
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Transcript of the uploaded audio plus the full reply payload
    Response { transcript: String, payload: Value },
    /// Service-side failure for the last upload
    Error { message: String },
    /// Valid JSON with a missing or unrecognized `type`
    Unknown(String),
}

impl InboundMessage {
    /// Parse a text frame. Fails on invalid JSON or when a recognized type
    /// lacks its required field.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct ResponsePeek {
            transcript: String,
        }

        #[derive(Deserialize)]
        struct ErrorPeek {
            message: String,
        }

        let payload: Value = serde_json::from_str(text)?;

        match payload.get("type").and_then(Value::as_str) {
            Some("response") => {
                let peek = ResponsePeek::deserialize(&payload)?;
                Ok(InboundMessage::Response {
                    transcript: peek.transcript,
                    payload,
                })
            }
            Some("error") => {
                let peek = ErrorPeek::deserialize(&payload)?;
                Ok(InboundMessage::Error {
                    message: peek.message,
                })
            }
            _ => Ok(InboundMessage::Unknown(text.to_string())),
        }
    }
}

/// Typed view of a `response` payload as sent by the voice service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub transcript: String,
    pub ai_response: Option<String>,
    pub emotion: Option<String>,
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub fraud_alert: bool,
    /// Base64 MP3 of the synthesized reply, empty when TTS is unavailable
    pub audio_base64: Option<String>,
}

impl VoiceResponse {
    pub fn from_payload(payload: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(payload)
    }
}
