// Scripted transport and capture doubles shared by the integration tests
#![allow(dead_code)]

use bytes::Bytes;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_link::audio::OPUS_WEBM;
use voice_link::{
    AudioRecorder, CaptureBackend, CaptureError, CaptureProfile, CaptureState, Connection,
    ConnectionEvents, MediaStream, SessionCallbacks, Transport, TransportError, VoiceSession,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Status(String),
    Transcript(String),
    Response(Value),
    Error(String),
    RecordingStart,
    RecordingStop,
}

/// Collects every callback invocation in order
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn callbacks(&self) -> SessionCallbacks {
        let status = self.clone();
        let transcript = self.clone();
        let response = self.clone();
        let error = self.clone();
        let start = self.clone();
        let stop = self.clone();

        SessionCallbacks::new()
            .on_status_change(move |s| status.push(Event::Status(s.to_string())))
            .on_transcript(move |t| transcript.push(Event::Transcript(t.to_string())))
            .on_response(move |p| response.push(Event::Response(p.clone())))
            .on_error(move |e| error.push(Event::Error(e.to_string())))
            .on_recording_start(move || start.push(Event::RecordingStart))
            .on_recording_stop(move || stop.push(Event::RecordingStop))
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}

pub async fn wait_for_capture(session: &VoiceSession, state: CaptureState) {
    for _ in 0..400 {
        if session.stats().await.unwrap().capture == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("capture never reached {:?}", state);
}

// Transport

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenMode {
    /// Report Opened as soon as the connection is requested
    Immediate,
    /// The test drives the lifecycle through `events()`
    Manual,
    /// Report Error then Closed
    Refuse,
}

#[derive(Default)]
struct TransportLog {
    urls: Vec<String>,
    events: Vec<ConnectionEvents>,
    sent: Vec<Bytes>,
    closed: usize,
}

#[derive(Clone)]
pub struct MockTransport {
    mode: OpenMode,
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            log: Arc::default(),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.log.lock().unwrap().urls.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.log.lock().unwrap().urls.clone()
    }

    /// Event sink of the most recent connection
    pub fn events(&self) -> ConnectionEvents {
        self.log
            .lock()
            .unwrap()
            .events
            .last()
            .cloned()
            .expect("no connection requested")
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.log.lock().unwrap().sent.clone()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }
}

impl Transport for MockTransport {
    fn connect(&self, url: &str, events: ConnectionEvents) -> Box<dyn Connection> {
        match self.mode {
            OpenMode::Immediate => events.opened(),
            OpenMode::Refuse => {
                events.error("connection refused");
                events.closed();
            }
            OpenMode::Manual => {}
        }

        let mut log = self.log.lock().unwrap();
        log.urls.push(url.to_string());
        log.events.push(events);

        Box::new(MockConnection {
            log: Arc::clone(&self.log),
        })
    }
}

struct MockConnection {
    log: Arc<Mutex<TransportLog>>,
}

impl Connection for MockConnection {
    fn send_binary(&mut self, payload: Bytes) -> Result<(), TransportError> {
        self.log.lock().unwrap().sent.push(payload);
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().unwrap().closed += 1;
    }
}

// Capture

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Permission {
    Grant,
    Deny,
    NoDevice,
}

#[derive(Default)]
struct CaptureLog {
    requests: usize,
    released: usize,
    mime_types: Vec<String>,
    /// Data sender of every recorder opened so far; `None` once it finished
    recorders: Vec<Option<mpsc::Sender<Bytes>>>,
    /// Keep a stopped recorder's channel open, as one still flushing would
    linger: bool,
}

/// Capture backend whose recorder emits whatever the test pushes
#[derive(Clone)]
pub struct MockCapture {
    permission: Permission,
    log: Arc<Mutex<CaptureLog>>,
}

impl MockCapture {
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            log: Arc::default(),
        }
    }

    pub fn requests(&self) -> usize {
        self.log.lock().unwrap().requests
    }

    pub fn released(&self) -> usize {
        self.log.lock().unwrap().released
    }

    pub fn mime_types(&self) -> Vec<String> {
        self.log.lock().unwrap().mime_types.clone()
    }

    /// Number of recorders opened so far
    pub fn recorder_count(&self) -> usize {
        self.log.lock().unwrap().recorders.len()
    }

    /// When set, stopping a recorder no longer closes its data channel
    pub fn set_linger(&self, linger: bool) {
        self.log.lock().unwrap().linger = linger;
    }

    /// Deliver a data chunk from the most recent recorder
    pub async fn push(&self, chunk: &[u8]) {
        let index = self.recorder_count().checked_sub(1).expect("no recorder opened");
        self.push_to(index, chunk).await;
    }

    /// Deliver a data chunk from the recorder opened `index`-th
    pub async fn push_to(&self, index: usize, chunk: &[u8]) {
        let tx = self.log.lock().unwrap().recorders[index]
            .clone()
            .expect("recorder already finished");
        tx.send(Bytes::copy_from_slice(chunk)).await.unwrap();
    }

    /// Make the most recent recorder finish on its own
    pub fn finish(&self) {
        if let Some(last) = self.log.lock().unwrap().recorders.last_mut() {
            *last = None;
        }
    }

    /// Close the data channel of the recorder opened `index`-th
    pub fn finish_recorder(&self, index: usize) {
        self.log.lock().unwrap().recorders[index] = None;
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MockCapture {
    async fn request_microphone(
        &self,
        _profile: &CaptureProfile,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        self.log.lock().unwrap().requests += 1;

        match self.permission {
            Permission::Grant => Ok(Box::new(MockStream {
                log: Arc::clone(&self.log),
                live: true,
            })),
            Permission::Deny => Err(CaptureError::PermissionDenied),
            Permission::NoDevice => Err(CaptureError::NotFound("no input device".into())),
        }
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == OPUS_WEBM
    }

    fn open_recorder(
        &self,
        _stream: &dyn MediaStream,
        mime_type: &str,
    ) -> Result<Box<dyn AudioRecorder>, CaptureError> {
        self.log.lock().unwrap().mime_types.push(mime_type.to_string());
        Ok(Box::new(MockRecorder {
            log: Arc::clone(&self.log),
            index: None,
        }))
    }
}

struct MockStream {
    log: Arc<Mutex<CaptureLog>>,
    live: bool,
}

impl MediaStream for MockStream {
    fn release(&mut self) {
        if self.live {
            self.live = false;
            self.log.lock().unwrap().released += 1;
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct MockRecorder {
    log: Arc<Mutex<CaptureLog>>,
    /// Slot in `CaptureLog::recorders`, set on start
    index: Option<usize>,
}

impl AudioRecorder for MockRecorder {
    fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        let (tx, rx) = mpsc::channel(64);
        let mut log = self.log.lock().unwrap();
        self.index = Some(log.recorders.len());
        log.recorders.push(Some(tx));
        Ok(rx)
    }

    fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.linger {
            return;
        }
        if let Some(index) = self.index {
            log.recorders[index] = None;
        }
    }

    fn is_recording(&self) -> bool {
        let log = self.log.lock().unwrap();
        self.index
            .is_some_and(|index| log.recorders[index].is_some())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
