use serde::{Deserialize, Serialize};

/// Lifecycle of the session's duplex connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Lifecycle of the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Recording,
    /// Stop was requested; waiting for the recorder to flush
    Stopping,
}
