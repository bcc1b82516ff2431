use thiserror::Error;

/// Outcome of a failed connection attempt, shared by every caller waiting on it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("connection closed")]
    Closed,

    #[error("session disconnected")]
    Disconnected,

    #[error("session is no longer running")]
    Terminated,
}
