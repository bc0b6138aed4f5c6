use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] seedlink4_protocol::SeedlinkError),
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("INFO document not serializable: {0}")]
    Info(serde_json::Error),
    #[error("command line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not running")]
    NotRunning,
    #[error("server did not stop within {0:?}")]
    StopTimeout(Duration),
}

impl ServerError {
    /// True if the error is a binary framing fault on a producer stream.
    pub fn is_framing_fault(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_framing_fault())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
