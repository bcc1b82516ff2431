use anyhow::Result;
use serde::Deserialize;

use crate::audio::{CaptureProfile, OPUS_WEBM, WEBM};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Scheme and host of the voice service
    pub ws_base: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Recorder encodings in order of preference
    pub encodings: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaybackConfig {
    /// Command that plays MP3 from stdin; empty disables playback
    pub command: Vec<String>,
}

impl Config {
    /// Load from `path` (extension optional, file optional) layered over
    /// defaults, then `VOICE_LINK_<SECTION>__<KEY>` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("server.ws_base", "ws://localhost:8000")?
            .set_default("capture.sample_rate", 16000_i64)?
            .set_default("capture.channels", 1_i64)?
            .set_default("capture.echo_cancellation", true)?
            .set_default("capture.noise_suppression", true)?
            .set_default("capture.encodings", vec![OPUS_WEBM, WEBM])?
            .set_default(
                "playback.command",
                vec!["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "-"],
            )?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_LINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session settings with a fresh session ID
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ws_base: self.server.ws_base.clone(),
            profile: CaptureProfile {
                sample_rate: self.capture.sample_rate,
                channels: self.capture.channels,
                echo_cancellation: self.capture.echo_cancellation,
                noise_suppression: self.capture.noise_suppression,
            },
            encodings: self.capture.encodings.clone(),
            ..SessionConfig::default()
        }
    }
}
