#[derive(Debug, thiserror::Error)]
pub enum SeedlinkError {
    #[error("frame too short: expected {expected}, actual {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("unrecognized frame signature: {0:02X?}")]
    InvalidSignature(Vec<u8>),

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("server error: [{code}] {description}")]
    ServerError { code: String, description: String },

    #[error("invalid payload format: {0:#04X}")]
    InvalidPayloadFormat(u8),

    #[error("invalid payload subformat: {0:#04X}")]
    InvalidPayloadSubformat(u8),

    #[error("payload length mismatch: expected {expected}, actual {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    #[error("declared payload length {declared} exceeds maximum {max}")]
    PayloadTooLarge { declared: usize, max: usize },

    #[error("invalid station id: {0}")]
    InvalidStationId(String),

    #[error("record cannot be framed as {0}")]
    Unrepresentable(&'static str),

    #[error("truncated frame: stream ended with {expected} bytes expected")]
    Truncated { expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SeedlinkError {
    /// Returns true for faults after which a binary stream cannot be resynchronized.
    pub fn is_framing_fault(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::InvalidSignature(_)
                | Self::InvalidSequence(_)
                | Self::PayloadLengthMismatch { .. }
                | Self::PayloadTooLarge { .. }
                | Self::InvalidStationId(_)
                | Self::Truncated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SeedlinkError>;
