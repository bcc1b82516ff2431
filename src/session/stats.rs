use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{CaptureState, ConnectionState};

/// Snapshot of a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub connection: ConnectionState,

    pub capture: CaptureState,

    /// When the session was created
    pub created_at: DateTime<Utc>,

    /// Recordings transmitted to the service
    pub recordings_sent: usize,

    /// Total audio bytes transmitted
    pub bytes_sent: usize,

    /// `response` messages received
    pub responses_received: usize,

    /// Chunks accumulated for the recording in progress
    pub buffered_chunks: usize,
}
