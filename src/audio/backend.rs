use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Encoding preferred by the session when the platform offers it
pub const OPUS_WEBM: &str = "audio/webm;codecs=opus";

/// Generic container used when Opus is unavailable
pub const WEBM: &str = "audio/webm";

/// Failures while acquiring or driving a capture device
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The user (or platform policy) refused microphone access
    #[error("microphone access denied")]
    PermissionDenied,

    /// No input device or source matched the request
    #[error("audio input not found: {0}")]
    NotFound(String),

    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("capture device error: {0}")]
    Device(String),
}

/// Microphone request constraints
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProfile {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Speech models expect 16kHz
            channels: 1,        // Mono
            echo_cancellation: true,
            noise_suppression: true,
        }
    }
}

/// A granted audio input stream.
///
/// Owns the hardware handle; `release` must stop every track so the
/// device indicator goes off.
pub trait MediaStream: Send {
    /// Stop all tracks. Calling it twice is harmless.
    fn release(&mut self);

    /// Whether any track is still live
    fn is_live(&self) -> bool;

    /// Lets a backend recover its own stream type in `open_recorder`
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A recorder bound to a `MediaStream`.
///
/// Compressed data is delivered in chunks on the receiver returned by
/// `start`. After `stop` the recorder flushes whatever it still buffers and
/// then closes the channel; the closed channel is the stop confirmation.
/// A recorder may also close the channel on its own (device unplugged,
/// source exhausted).
pub trait AudioRecorder: Send {
    /// Begin capture
    fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError>;

    /// Ask the recorder to flush and finish
    fn stop(&mut self);

    /// Check if the recorder is still capturing
    fn is_recording(&self) -> bool;

    /// Get recorder name for logging
    fn name(&self) -> &str;
}

/// Platform capture facility.
///
/// Implementations:
/// - File: replays a WAV file as if it were a microphone (CLI, tests)
/// - Anything else that can hand out encoded chunks (browser bridge, cpal + encoder)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Request microphone access. Suspends until the platform grants or denies it.
    async fn request_microphone(
        &self,
        profile: &CaptureProfile,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;

    /// Whether recorders from this backend can produce `mime_type`
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Container used when none of the preferred encodings is supported
    fn fallback_type(&self) -> &str {
        WEBM
    }

    /// Open a recorder on a granted stream
    fn open_recorder(
        &self,
        stream: &dyn MediaStream,
        mime_type: &str,
    ) -> Result<Box<dyn AudioRecorder>, CaptureError>;
}

/// Pick the first supported encoding from `preferences`, falling back to the
/// backend's generic container.
pub fn select_encoding(backend: &dyn CaptureBackend, preferences: &[String]) -> String {
    preferences
        .iter()
        .find(|mime| backend.is_type_supported(mime))
        .cloned()
        .unwrap_or_else(|| backend.fallback_type().to_string())
}

/// Default encoding preference list
pub fn default_encodings() -> Vec<String> {
    vec![OPUS_WEBM.to_string(), WEBM.to_string()]
}
