use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use voice_link::{
    play_audio_base64, CommandPlayer, Config, FileCapture, SessionCallbacks, VoiceResponse,
    VoiceSession, WsTransport,
};

#[derive(Parser)]
#[command(name = "voice-link", version, about = "Talk to a voice assistant service")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/voice-link")]
    config: String,

    /// Override the service base URL (e.g. ws://localhost:8000)
    #[arg(long)]
    server: Option<String>,

    /// Do not play the synthesized reply
    #[arg(long)]
    no_playback: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one utterance from a WAV file and print the reply
    Send {
        /// WAV file used as the microphone
        file: PathBuf,

        /// Give up waiting for a reply after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Press Enter to start or stop recording; Ctrl-D quits
    Talk {
        /// WAV file used as the microphone
        file: PathBuf,
    },
}

enum UiEvent {
    Response(Value),
    Error(String),
}

fn callbacks(events: mpsc::UnboundedSender<UiEvent>) -> SessionCallbacks {
    let errors = events.clone();

    SessionCallbacks::new()
        .on_status_change(|status| info!("Status: {}", status))
        .on_transcript(|text| println!("You: {}", text))
        .on_response(move |payload| {
            let _ = events.send(UiEvent::Response(payload.clone()));
        })
        .on_error(move |message| {
            let _ = errors.send(UiEvent::Error(message.to_string()));
        })
        .on_recording_start(|| println!("● recording"))
        .on_recording_stop(|| println!("■ stopped"))
}

async fn show_response(payload: &Value, player: Option<&CommandPlayer>) {
    let response = match VoiceResponse::from_payload(payload) {
        Ok(response) => response,
        Err(e) => {
            warn!("Unexpected response shape: {}", e);
            return;
        }
    };

    if let Some(reply) = &response.ai_response {
        println!("Assistant: {}", reply);
    }
    if let Some(emotion) = &response.emotion {
        info!(
            "Emotion: {} (sentiment {:.2}, urgent: {}, fraud alert: {})",
            emotion,
            response.sentiment_score.unwrap_or_default(),
            response.is_urgent,
            response.fraud_alert
        );
    }

    if let (Some(player), Some(audio)) = (player, response.audio_base64.as_deref()) {
        play_audio_base64(audio, player).await;
    }
}

async fn send(
    session: &VoiceSession,
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    player: Option<&CommandPlayer>,
    timeout: Duration,
) -> Result<()> {
    session.start().await;

    let outcome = tokio::time::timeout(timeout, async {
        while let Some(event) = events.recv().await {
            match event {
                UiEvent::Response(payload) => {
                    show_response(&payload, player).await;
                    return Ok(());
                }
                UiEvent::Error(message) => return Err(anyhow!(message)),
            }
        }
        Err(anyhow!("session ended without a reply"))
    })
    .await
    .context("Timed out waiting for a reply")?;

    session.disconnect().await;
    outcome
}

async fn talk(
    session: &VoiceSession,
    mut events: mpsc::UnboundedReceiver<UiEvent>,
    player: Option<CommandPlayer>,
) -> Result<()> {
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UiEvent::Response(payload) => show_response(&payload, player.as_ref()).await,
                UiEvent::Error(message) => eprintln!("Error: {}", message),
            }
        }
    });

    println!("Press Enter to start/stop recording, Ctrl-D to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while lines.next_line().await?.is_some() {
        session.toggle().await;
    }

    session.disconnect().await;
    printer.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(server) = cli.server {
        cfg.server.ws_base = server;
    }
    info!("Voice service: {}", cfg.server.ws_base);

    let player = if cli.no_playback {
        None
    } else {
        CommandPlayer::from_command(&cfg.playback.command)
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WsTransport::new());

    match cli.command {
        Commands::Send { file, timeout_secs } => {
            let session = VoiceSession::new(
                cfg.session_config(),
                transport,
                Arc::new(FileCapture::new(file)),
                callbacks(events_tx),
            );
            info!("Session {}", session.session_id());
            send(
                &session,
                events_rx,
                player.as_ref(),
                Duration::from_secs(timeout_secs),
            )
            .await
        }
        Commands::Talk { file } => {
            let session = VoiceSession::new(
                cfg.session_config(),
                transport,
                Arc::new(FileCapture::new(file)),
                callbacks(events_tx),
            );
            info!("Session {}", session.session_id());
            talk(&session, events_rx, player).await
        }
    }
}
