use anyhow::{Context, Result};
use bytes::Bytes;
use hound::WavReader;
use std::any::Any;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioRecorder, CaptureBackend, CaptureError, CaptureProfile, MediaStream};

/// MIME type produced by the file recorder
pub const WAV: &str = "audio/wav";

/// Interval at which a realtime file recorder advances through the samples
const TICK: Duration = Duration::from_millis(100);

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Convert to the requested profile: mono mixdown, then decimation.
    ///
    /// Returns interleaved samples with their rate and channel count. Channels
    /// are only ever mixed down to mono, and only integer-ratio downsampling is
    /// done; a lower source rate is kept as is.
    pub fn conform(&self, profile: &CaptureProfile) -> (Vec<i16>, u32, u16) {
        let (mut samples, channels) = if self.channels > 1 && profile.channels == 1 {
            (mix_to_mono(&self.samples, self.channels), 1)
        } else {
            (self.samples.clone(), self.channels.max(1))
        };

        let mut sample_rate = self.sample_rate;
        let ratio = self.sample_rate / profile.sample_rate.max(1);
        if ratio > 1 {
            // Keep whole frames so channels stay aligned
            samples = samples
                .chunks_exact(channels as usize)
                .step_by(ratio as usize)
                .flatten()
                .copied()
                .collect();
            sample_rate = self.sample_rate / ratio;
        }

        (samples, sample_rate, channels)
    }
}

/// Average interleaved channels into one
fn mix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Encode interleaved 16-bit PCM as an in-memory WAV container
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }

    Ok(cursor.into_inner())
}

/// Capture backend that treats a WAV file as the microphone.
///
/// Granting access loads and conforms the file; the recorder then plays
/// through it (in real time unless disabled) and emits a WAV container
/// holding whatever was captured when it stops.
pub struct FileCapture {
    path: PathBuf,
    deny_permission: bool,
    realtime: bool,
    chunk_bytes: usize,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            deny_permission: false,
            realtime: true,
            chunk_bytes: 16 * 1024,
        }
    }

    /// Refuse every microphone request, as a user dismissing the prompt would
    pub fn deny_permission(mut self, deny: bool) -> Self {
        self.deny_permission = deny;
        self
    }

    /// When disabled the whole file is captured at once and the recorder
    /// finishes on its own.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Maximum size of each emitted data chunk
    pub fn chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn request_microphone(
        &self,
        profile: &CaptureProfile,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        if self.deny_permission {
            warn!("Microphone request denied for {}", self.path.display());
            return Err(CaptureError::PermissionDenied);
        }

        if !self.path.exists() {
            return Err(CaptureError::NotFound(self.path.display().to_string()));
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| CaptureError::Device(e.to_string()))?
            .map_err(|e| CaptureError::Device(format!("{:#}", e)))?;

        let (samples, sample_rate, channels) = audio.conform(profile);
        debug!(
            "File stream ready: {} samples at {}Hz x{} (requested {}Hz x{})",
            samples.len(),
            sample_rate,
            channels,
            profile.sample_rate,
            profile.channels
        );

        Ok(Box::new(FileStream {
            samples: Arc::new(samples),
            sample_rate,
            channels,
            live: true,
        }))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == WAV
    }

    fn fallback_type(&self) -> &str {
        WAV
    }

    fn open_recorder(
        &self,
        stream: &dyn MediaStream,
        mime_type: &str,
    ) -> Result<Box<dyn AudioRecorder>, CaptureError> {
        if !self.is_type_supported(mime_type) {
            return Err(CaptureError::UnsupportedEncoding(mime_type.to_string()));
        }

        let stream = stream
            .as_any()
            .downcast_ref::<FileStream>()
            .ok_or_else(|| CaptureError::Device("stream was not opened by this backend".into()))?;

        if !stream.live {
            return Err(CaptureError::Device("stream already released".into()));
        }

        Ok(Box::new(FileRecorder {
            samples: Arc::clone(&stream.samples),
            sample_rate: stream.sample_rate,
            channels: stream.channels,
            realtime: self.realtime,
            chunk_bytes: self.chunk_bytes,
            stop_tx: None,
            recording: Arc::new(AtomicBool::new(false)),
        }))
    }
}

pub struct FileStream {
    samples: Arc<Vec<i16>>,
    sample_rate: u32,
    channels: u16,
    live: bool,
}

impl MediaStream for FileStream {
    fn release(&mut self) {
        if self.live {
            debug!("Releasing file stream");
        }
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct FileRecorder {
    samples: Arc<Vec<i16>>,
    sample_rate: u32,
    channels: u16,
    realtime: bool,
    chunk_bytes: usize,
    stop_tx: Option<oneshot::Sender<()>>,
    recording: Arc<AtomicBool>,
}

impl AudioRecorder for FileRecorder {
    fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        if self.stop_tx.is_some() {
            return Err(CaptureError::Device("recorder already started".into()));
        }

        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        self.stop_tx = Some(stop_tx);
        self.recording.store(true, Ordering::SeqCst);

        let samples = Arc::clone(&self.samples);
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let realtime = self.realtime;
        let chunk_bytes = self.chunk_bytes;
        let recording = Arc::clone(&self.recording);

        tokio::spawn(async move {
            let captured = if realtime {
                let frames_per_tick = (sample_rate as u128 * TICK.as_millis() / 1000) as usize;
                let per_tick = frames_per_tick * channels as usize;
                let mut position = 0usize;
                let mut ticker = tokio::time::interval(TICK);

                loop {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = ticker.tick() => {
                            position = (position + per_tick).min(samples.len());
                            if position == samples.len() {
                                info!("File source exhausted, recorder stopping");
                                break;
                            }
                        }
                    }
                }
                position
            } else {
                samples.len()
            };

            match encode_wav(&samples[..captured], sample_rate, channels) {
                Ok(wav) => {
                    for piece in wav.chunks(chunk_bytes) {
                        if tx.send(Bytes::copy_from_slice(piece)).await.is_err() {
                            debug!("Recorder receiver dropped before flush completed");
                            break;
                        }
                    }
                }
                Err(e) => error!("Failed to encode captured audio: {:#}", e),
            }

            recording.store(false, Ordering::SeqCst);
        });

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}
