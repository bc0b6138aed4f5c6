use std::time::Duration;

/// Errors that can occur during SeedLink client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// TCP or socket I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or command line.
    #[error("protocol error: {0}")]
    Protocol(#[from] seedlink4_protocol::SeedlinkError),

    /// Operation exceeded the configured timeout duration.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Server closed the connection (read returned 0 bytes).
    #[error("disconnected")]
    Disconnected,

    /// Server returned an ERROR response to a command.
    #[error("server error: {0}")]
    ServerError(String),

    /// Method called in the wrong state (e.g., `send` before `feed`).
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Server sent an unexpected response line.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// True if the error came from a malformed binary frame.
    pub fn is_framing_fault(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_framing_fault())
    }
}

/// Convenience alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;
