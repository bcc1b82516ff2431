pub mod backend;
pub mod file;
pub mod playback;

pub use backend::{
    default_encodings, select_encoding, AudioRecorder, CaptureBackend, CaptureError,
    CaptureProfile, MediaStream, OPUS_WEBM, WEBM,
};
pub use file::{AudioFile, FileCapture, WAV};
pub use playback::{play_audio_base64, AudioPlayer, CommandPlayer};
