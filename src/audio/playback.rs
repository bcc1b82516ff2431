use anyhow::{Context, Result};
use base64::Engine;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Something that can play a decoded reply clip (MP3 from the speech service)
#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
}

/// Decode a base64 reply clip and hand it to `player`.
///
/// Empty input is a no-op. Decode and playback failures are logged only.
pub async fn play_audio_base64(payload: &str, player: &dyn AudioPlayer) {
    if payload.is_empty() {
        return;
    }

    let audio = match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(audio) => audio,
        Err(e) => {
            warn!("Audio playback error: invalid base64 payload: {}", e);
            return;
        }
    };

    debug!("Playing {} bytes of reply audio", audio.len());

    if let Err(e) = player.play(audio).await {
        error!("Audio playback error: {:#}", e);
    }
}

/// Plays audio by piping it into an external command's stdin
/// (e.g. `ffplay -nodisp -autoexit -loglevel quiet -`).
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    /// Build from a full command line; `None` if it is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn player `{}`", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&audio)
                .await
                .context("Failed to write audio to player")?;
        }

        let status = child.wait().await.context("Player did not run")?;
        if !status.success() {
            anyhow::bail!("Player exited with {}", status);
        }

        Ok(())
    }
}
