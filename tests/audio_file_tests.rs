// Integration tests for the WAV-file capture backend
//
// Fixtures are generated into a temp dir so the tests do not depend on
// checked-in audio.

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::{wait_for_capture, Event, EventLog, MockTransport, OpenMode};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use voice_link::audio::{AudioFile, FileCapture, OPUS_WEBM, WAV};
use voice_link::session::STATUS_PROCESSING;
use voice_link::{CaptureBackend, CaptureError, CaptureProfile, CaptureState, SessionConfig, VoiceSession};

/// One second of a 48kHz stereo ramp
fn write_fixture(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("utterance.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..48000 {
        let sample = (i % 1000) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(path)
}

async fn collect(mut rx: mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    chunks
}

fn decode(chunks: &[Bytes]) -> hound::WavReader<Cursor<Vec<u8>>> {
    let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
    hound::WavReader::new(Cursor::new(bytes)).unwrap()
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 96000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_capture_conforms_to_profile() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;
    let capture = FileCapture::new(&path).realtime(false).chunk_bytes(1000);

    let stream = capture.request_microphone(&CaptureProfile::default()).await?;
    assert!(stream.is_live());

    let mut recorder = capture.open_recorder(&*stream, WAV)?;
    let chunks = collect(recorder.start()?).await;

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.len() <= 1000));

    let reader = decode(&chunks);
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len(), 16000);

    Ok(())
}

#[tokio::test]
async fn test_capture_keeps_stereo_for_stereo_profile() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;
    let capture = FileCapture::new(&path).realtime(false);
    let profile = CaptureProfile {
        channels: 2,
        ..CaptureProfile::default()
    };

    let stream = capture.request_microphone(&profile).await?;
    let mut recorder = capture.open_recorder(&*stream, WAV)?;
    let chunks = collect(recorder.start()?).await;

    let mut reader = decode(&chunks);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 16000);
    // One second of stereo frames
    assert_eq!(reader.duration(), 16000);
    assert_eq!(reader.len(), 32000);

    // Both channels carry the same ramp, so every frame must match
    let samples: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
    assert!(samples.chunks_exact(2).all(|frame| frame[0] == frame[1]));
    assert_eq!(&samples[..6], &[0, 0, 3, 3, 6, 6]);

    Ok(())
}

#[tokio::test]
async fn test_realtime_recorder_flushes_on_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;
    let capture = FileCapture::new(&path);

    let stream = capture.request_microphone(&CaptureProfile::default()).await?;
    let mut recorder = capture.open_recorder(&*stream, WAV)?;
    let rx = recorder.start()?;
    assert!(recorder.is_recording());

    tokio::time::sleep(Duration::from_millis(250)).await;
    recorder.stop();
    let chunks = collect(rx).await;

    let captured = decode(&chunks).len();
    assert!(captured > 0, "some audio captured before stop");
    assert!(captured < 16000, "stopped before the file ran out");
    assert!(!recorder.is_recording());

    Ok(())
}

#[tokio::test]
async fn test_denied_and_missing_sources() {
    let capture = FileCapture::new("/nonexistent/utterance.wav");
    let result = capture.request_microphone(&CaptureProfile::default()).await;
    assert!(matches!(result, Err(CaptureError::NotFound(_))));

    let capture = FileCapture::new("/nonexistent/utterance.wav").deny_permission(true);
    let result = capture.request_microphone(&CaptureProfile::default()).await;
    assert!(matches!(result, Err(CaptureError::PermissionDenied)));
}

#[tokio::test]
async fn test_rejects_unsupported_encoding() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;
    let capture = FileCapture::new(&path);

    assert!(!capture.is_type_supported(OPUS_WEBM));
    assert_eq!(capture.fallback_type(), WAV);

    let stream = capture.request_microphone(&CaptureProfile::default()).await?;
    let result = capture.open_recorder(&*stream, OPUS_WEBM);
    assert!(matches!(result, Err(CaptureError::UnsupportedEncoding(_))));

    Ok(())
}

#[tokio::test]
async fn test_session_uploads_file_as_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_fixture(dir.path())?;

    let transport = MockTransport::new(OpenMode::Immediate);
    let log = EventLog::default();
    let session = VoiceSession::new(
        SessionConfig::default(),
        Arc::new(transport.clone()),
        Arc::new(FileCapture::new(&path).realtime(false)),
        log.callbacks(),
    );

    session.start().await;
    wait_for_capture(&session, CaptureState::Idle).await;

    // The file source runs out by itself
    assert_eq!(log.count(&Event::RecordingStart), 1);
    assert_eq!(log.count(&Event::RecordingStop), 1);
    assert_eq!(log.count(&Event::Status(STATUS_PROCESSING.into())), 1);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(&sent[0][0..4], b"RIFF");
    assert_eq!(decode(&sent).len(), 16000);

    Ok(())
}
