use super::callbacks::{
    SessionCallbacks, CONNECTION_ERROR, NOT_CONNECTED, PERMISSION_DENIED, START_FAILED,
    STATUS_CONNECTED, STATUS_DISCONNECTED, STATUS_PROCESSING, STATUS_RECORDING,
};
use super::config::SessionConfig;
use super::error::SessionError;
use super::state::{CaptureState, ConnectionState};
use super::stats::SessionStats;
use crate::audio::{select_encoding, AudioRecorder, CaptureBackend, CaptureError, MediaStream};
use crate::transport::{
    Connection, ConnectionEvents, InboundMessage, Transport, TransportEvent,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// One voice session: a connection to the voice service plus the microphone
/// recordings uploaded over it.
///
/// The handle is cheap; all state lives in a control task that processes
/// commands and platform events one at a time. Dropping the handle tears the
/// session down like `disconnect`.
pub struct VoiceSession {
    session_id: String,
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Toggle(oneshot::Sender<()>),
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    EnsureConnection(oneshot::Sender<Result<(), SessionError>>),
    Disconnect(oneshot::Sender<()>),
    Stats(oneshot::Sender<SessionStats>),
}

enum CaptureEvent {
    Permission {
        attempt: u64,
        result: Result<Box<dyn MediaStream>, CaptureError>,
    },
    Data {
        generation: u64,
        chunk: Bytes,
    },
    /// The recorder's channel closed: everything it captured has been delivered
    Finished {
        generation: u64,
    },
}

impl VoiceSession {
    /// Create a session and spawn its control task. Must be called inside a
    /// tokio runtime. Nothing is opened until the first start or
    /// `ensure_connection`.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        capture: Arc<dyn CaptureBackend>,
        callbacks: SessionCallbacks,
    ) -> Self {
        info!("Creating voice session: {}", config.session_id);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        let session_id = config.session_id.clone();

        let core = SessionCore {
            config,
            transport,
            capture,
            callbacks,
            transport_tx,
            capture_tx,
            connection_state: ConnectionState::Unconnected,
            connection: None,
            connection_id: 0,
            connect_waiters: Vec::new(),
            capture_state: CaptureState::Idle,
            stream: None,
            recorder: None,
            generation: 0,
            pending_chunks: Vec::new(),
            pending_start: None,
            next_attempt: 0,
            created_at: Utc::now(),
            recordings_sent: 0,
            bytes_sent: 0,
            responses_received: 0,
        };

        tokio::spawn(core.run(commands_rx, transport_rx, capture_rx));

        Self {
            session_id,
            commands: commands_tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop if recording, start otherwise
    pub async fn toggle(&self) {
        self.request(Command::Toggle).await;
    }

    /// Connect if needed, acquire the microphone and begin recording.
    ///
    /// Resolves once recording has begun or the attempt failed; failures are
    /// reported through `on_error` only.
    pub async fn start(&self) {
        self.request(Command::Start).await;
    }

    /// Ask the recorder to finish. The upload happens once it has flushed.
    /// Does nothing unless recording.
    pub async fn stop(&self) {
        self.request(Command::Stop).await;
    }

    /// Open the connection unless it already is. Concurrent callers share a
    /// single attempt and observe the same outcome.
    pub async fn ensure_connection(&self) -> Result<(), SessionError> {
        self.request(Command::EnsureConnection)
            .await
            .unwrap_or(Err(SessionError::Terminated))
    }

    /// Close the connection and release the microphone without firing any
    /// callbacks. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.request(Command::Disconnect).await;
    }

    pub async fn stats(&self) -> Result<SessionStats, SessionError> {
        self.request(Command::Stats)
            .await
            .ok_or(SessionError::Terminated)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(command(tx)).is_err() {
            warn!("Voice session {} is no longer running", self.session_id);
            return None;
        }
        rx.await.ok()
    }
}

enum ConnectWaiter {
    Caller(oneshot::Sender<Result<(), SessionError>>),
    Start(u64),
}

struct PendingStart {
    attempt: u64,
    waiters: Vec<oneshot::Sender<()>>,
}

struct SessionCore {
    /// Session configuration
    config: SessionConfig,

    /// Opens connections to the voice service
    transport: Arc<dyn Transport>,

    /// Microphone access and recorders
    capture: Arc<dyn CaptureBackend>,

    /// Handlers registered by the UI
    callbacks: SessionCallbacks,

    /// Cloned into every connection so it can report back to this task
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,

    /// Permission results and recorder data flow back through here
    capture_tx: mpsc::UnboundedSender<CaptureEvent>,

    /// Lifecycle state of the current connection
    connection_state: ConnectionState,

    /// Handle of the current connection, if one was opened and not yet closed
    connection: Option<Box<dyn Connection>>,

    /// Id of the current connection attempt; events tagged otherwise are stale
    connection_id: u64,

    /// Callers and start attempts waiting on the connection in progress
    connect_waiters: Vec<ConnectWaiter>,

    /// Where the recording lifecycle stands
    capture_state: CaptureState,

    /// Granted microphone stream, held while recording
    stream: Option<Box<dyn MediaStream>>,

    /// Active recorder, held while recording or stopping
    recorder: Option<Box<dyn AudioRecorder>>,

    /// Tag of the current recording; recorder events tagged otherwise are stale
    generation: u64,

    /// Chunks of the current recording, in arrival order
    pending_chunks: Vec<Bytes>,

    /// Start that is waiting on the connection or on permission
    pending_start: Option<PendingStart>,

    /// Counter for start attempt ids
    next_attempt: u64,

    /// When the session was created
    created_at: DateTime<Utc>,

    /// Number of recordings uploaded
    recordings_sent: usize,

    /// Total audio bytes uploaded
    bytes_sent: usize,

    /// Number of response messages received
    responses_received: usize,
}

impl SessionCore {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
        mut capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    ) {
        debug!("Session task started: {}", self.config.session_id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((connection_id, event)) = transport_rx.recv() => {
                    self.handle_transport_event(connection_id, event);
                }
                Some(event) = capture_rx.recv() => self.handle_capture_event(event),
            }
        }

        self.disconnect();
        debug!("Session task stopped: {}", self.config.session_id);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Toggle(reply) => {
                if self.capture_state == CaptureState::Recording {
                    self.stop();
                    let _ = reply.send(());
                } else {
                    self.start(reply);
                }
            }
            Command::Start(reply) => self.start(reply),
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(());
            }
            Command::EnsureConnection(reply) => self.ensure_connection(ConnectWaiter::Caller(reply)),
            Command::Disconnect(reply) => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    // Connection

    fn ensure_connection(&mut self, waiter: ConnectWaiter) {
        match self.connection_state {
            ConnectionState::Open => self.resolve_waiter(waiter, Ok(())),
            ConnectionState::Connecting => self.connect_waiters.push(waiter),
            _ => {
                self.open_connection();
                self.connect_waiters.push(waiter);
            }
        }
    }

    fn open_connection(&mut self) {
        if let Some(mut previous) = self.connection.take() {
            previous.close();
        }

        self.connection_id += 1;
        let url = self.config.voice_url();
        info!("Opening connection {} to {}", self.connection_id, url);

        let events = ConnectionEvents::new(self.connection_id, self.transport_tx.clone());
        self.connection = Some(self.transport.connect(&url, events));
        self.connection_state = ConnectionState::Connecting;
    }

    fn resolve_waiter(&mut self, waiter: ConnectWaiter, result: Result<(), SessionError>) {
        match waiter {
            ConnectWaiter::Caller(reply) => {
                let _ = reply.send(result);
            }
            ConnectWaiter::Start(attempt) => match result {
                Ok(()) => self.request_microphone(attempt),
                Err(e) => self.fail_start(attempt, format!("{}{}", START_FAILED, e)),
            },
        }
    }

    fn resolve_waiters(&mut self, result: Result<(), SessionError>) {
        for waiter in std::mem::take(&mut self.connect_waiters) {
            self.resolve_waiter(waiter, result.clone());
        }
    }

    fn handle_transport_event(&mut self, connection_id: u64, event: TransportEvent) {
        if connection_id != self.connection_id || self.connection.is_none() {
            debug!("Ignoring event from stale connection {}: {:?}", connection_id, event);
            return;
        }

        match event {
            TransportEvent::Opened => {
                info!("Connection {} open", connection_id);
                self.connection_state = ConnectionState::Open;
                self.callbacks.status(STATUS_CONNECTED);
                self.resolve_waiters(Ok(()));
            }
            TransportEvent::Text(text) => self.handle_message(&text),
            TransportEvent::Binary(data) => {
                debug!("Ignoring {} byte binary frame", data.len());
            }
            TransportEvent::Error(message) => {
                error!("Connection {} error: {}", connection_id, message);
                self.connection_state = ConnectionState::Errored;
                self.callbacks.error(CONNECTION_ERROR);
                self.resolve_waiters(Err(SessionError::Connection(message)));
            }
            TransportEvent::Closed => {
                info!("Connection {} closed", connection_id);
                self.connection_state = ConnectionState::Closed;
                self.connection = None;
                self.callbacks.status(STATUS_DISCONNECTED);
                self.resolve_waiters(Err(SessionError::Closed));
            }
        }
    }

    fn handle_message(&mut self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Response {
                transcript,
                payload,
            }) => {
                self.responses_received += 1;
                info!("Received response (transcript: {} chars)", transcript.len());
                self.callbacks.transcript(&transcript);
                self.callbacks.response(&payload);
            }
            Ok(InboundMessage::Error { message }) => {
                warn!("Service reported error: {}", message);
                self.callbacks.error(&message);
            }
            Ok(InboundMessage::Unknown(raw)) => {
                debug!("Ignoring unrecognized message: {}", raw);
            }
            Err(e) => {
                warn!("Failed to parse message: {}", e);
            }
        }
    }

    // Recording

    fn start(&mut self, reply: oneshot::Sender<()>) {
        if self.capture_state != CaptureState::Idle {
            warn!("Recording already active ({:?})", self.capture_state);
            let _ = reply.send(());
            return;
        }

        if let Some(pending) = self.pending_start.as_mut() {
            debug!("Start already in progress (attempt {})", pending.attempt);
            pending.waiters.push(reply);
            return;
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        info!(
            "Starting recording for session {} (attempt {})",
            self.config.session_id, attempt
        );

        self.pending_start = Some(PendingStart {
            attempt,
            waiters: vec![reply],
        });
        self.ensure_connection(ConnectWaiter::Start(attempt));
    }

    fn is_pending(&self, attempt: u64) -> bool {
        self.pending_start
            .as_ref()
            .is_some_and(|pending| pending.attempt == attempt)
    }

    fn request_microphone(&mut self, attempt: u64) {
        if !self.is_pending(attempt) {
            return;
        }

        let capture = Arc::clone(&self.capture);
        let profile = self.config.profile.clone();
        let capture_tx = self.capture_tx.clone();

        tokio::spawn(async move {
            let result = capture.request_microphone(&profile).await;
            let _ = capture_tx.send(CaptureEvent::Permission { attempt, result });
        });
    }

    fn handle_permission(
        &mut self,
        attempt: u64,
        result: Result<Box<dyn MediaStream>, CaptureError>,
    ) {
        if !self.is_pending(attempt) {
            debug!("Discarding microphone result for abandoned attempt {}", attempt);
            if let Ok(mut stream) = result {
                stream.release();
            }
            return;
        }

        let mut stream = match result {
            Ok(stream) => stream,
            Err(CaptureError::PermissionDenied) => {
                self.fail_start(attempt, PERMISSION_DENIED.to_string());
                return;
            }
            Err(e) => {
                self.fail_start(attempt, format!("{}{}", START_FAILED, e));
                return;
            }
        };

        if self.connection_state != ConnectionState::Open {
            stream.release();
            self.fail_start(attempt, format!("{}{}", START_FAILED, SessionError::Closed));
            return;
        }

        match self.begin_capture(stream) {
            Ok(()) => self.complete_start(attempt),
            Err(e) => self.fail_start(attempt, format!("{}{}", START_FAILED, e)),
        }
    }

    fn begin_capture(&mut self, mut stream: Box<dyn MediaStream>) -> Result<(), CaptureError> {
        let mime_type = select_encoding(self.capture.as_ref(), &self.config.encodings);

        let opened = self
            .capture
            .open_recorder(&*stream, &mime_type)
            .and_then(|mut recorder| {
                let chunks = recorder.start()?;
                Ok((recorder, chunks))
            });

        let (recorder, mut chunks) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                stream.release();
                return Err(e);
            }
        };

        self.generation += 1;
        let generation = self.generation;
        self.pending_chunks.clear();

        let capture_tx = self.capture_tx.clone();
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                if capture_tx
                    .send(CaptureEvent::Data { generation, chunk })
                    .is_err()
                {
                    return;
                }
            }
            let _ = capture_tx.send(CaptureEvent::Finished { generation });
        });

        info!(
            "Recording {} with {} recorder (generation {})",
            mime_type,
            recorder.name(),
            generation
        );

        self.recorder = Some(recorder);
        self.stream = Some(stream);
        self.capture_state = CaptureState::Recording;
        Ok(())
    }

    fn complete_start(&mut self, attempt: u64) {
        let Some(pending) = self.pending_start.take() else {
            return;
        };
        debug!("Start attempt {} complete", attempt);

        self.callbacks.recording_started();
        self.callbacks.status(STATUS_RECORDING);

        for waiter in pending.waiters {
            let _ = waiter.send(());
        }
    }

    fn fail_start(&mut self, attempt: u64, message: String) {
        if !self.is_pending(attempt) {
            return;
        }
        let Some(pending) = self.pending_start.take() else {
            return;
        };

        error!("Recording error: {}", message);
        self.callbacks.error(&message);

        for waiter in pending.waiters {
            let _ = waiter.send(());
        }
    }

    fn stop(&mut self) {
        if self.capture_state != CaptureState::Recording {
            debug!("Stop ignored, not recording ({:?})", self.capture_state);
            return;
        }

        info!("Stopping recording for session {}", self.config.session_id);

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
        }
        self.capture_state = CaptureState::Stopping;
        self.callbacks.recording_stopped();
    }

    fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Permission { attempt, result } => self.handle_permission(attempt, result),
            CaptureEvent::Data { generation, chunk } => {
                if generation != self.generation || self.capture_state == CaptureState::Idle {
                    debug!("Dropping chunk from stale recording {}", generation);
                    return;
                }
                if !chunk.is_empty() {
                    self.pending_chunks.push(chunk);
                }
            }
            CaptureEvent::Finished { generation } => {
                if generation != self.generation || self.capture_state == CaptureState::Idle {
                    debug!("Ignoring stop of stale recording {}", generation);
                    return;
                }
                if self.capture_state == CaptureState::Recording {
                    info!("Recorder stopped on its own");
                    self.callbacks.recording_stopped();
                }
                self.finish_recording();
            }
        }
    }

    /// Upload the accumulated audio as one binary message, then release the device
    fn finish_recording(&mut self) {
        let chunks = std::mem::take(&mut self.pending_chunks);
        let total: usize = chunks.iter().map(Bytes::len).sum();

        let mut payload = BytesMut::with_capacity(total);
        for chunk in &chunks {
            payload.extend_from_slice(chunk);
        }

        match (self.connection_state, self.connection.as_mut()) {
            (ConnectionState::Open, Some(connection)) => {
                match connection.send_binary(payload.freeze()) {
                    Ok(()) => {
                        info!("Sent {} bytes of audio ({} chunks)", total, chunks.len());
                        self.recordings_sent += 1;
                        self.bytes_sent += total;
                        self.callbacks.status(STATUS_PROCESSING);
                    }
                    Err(e) => {
                        error!("Failed to send audio: {}", e);
                        self.callbacks.error(NOT_CONNECTED);
                    }
                }
            }
            _ => {
                warn!("Dropping {} bytes of audio, connection not open", total);
                self.callbacks.error(NOT_CONNECTED);
            }
        }

        self.release_capture();
    }

    fn release_capture(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        self.recorder = None;
        self.capture_state = CaptureState::Idle;
        self.pending_chunks.clear();
    }

    // Teardown

    fn disconnect(&mut self) {
        info!("Disconnecting voice session {}", self.config.session_id);

        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        // Anything the old connection still reports is now stale
        self.connection_id += 1;
        if self.connection_state != ConnectionState::Unconnected {
            self.connection_state = ConnectionState::Closed;
        }

        for waiter in std::mem::take(&mut self.connect_waiters) {
            if let ConnectWaiter::Caller(reply) = waiter {
                let _ = reply.send(Err(SessionError::Disconnected));
            }
        }

        if let Some(pending) = self.pending_start.take() {
            debug!("Abandoning start attempt {}", pending.attempt);
            for waiter in pending.waiters {
                let _ = waiter.send(());
            }
        }

        if let Some(mut recorder) = self.recorder.take() {
            recorder.stop();
        }
        self.generation += 1;
        self.release_capture();
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.config.session_id.clone(),
            connection: self.connection_state,
            capture: self.capture_state,
            created_at: self.created_at,
            recordings_sent: self.recordings_sent,
            bytes_sent: self.bytes_sent,
            responses_received: self.responses_received,
            buffered_chunks: self.pending_chunks.len(),
        }
    }
}
