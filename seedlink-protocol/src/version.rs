use crate::error::{Result, SeedlinkError};

/// Protocol version negotiated with `SLPROTO`.
///
/// Connections that never send `SLPROTO` speak [`ProtocolVersion::V3`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    #[default]
    V3,
    V4,
}

impl ProtocolVersion {
    /// Parse the argument of `SLPROTO`.
    ///
    /// Accepts `3.0`, `3.1` and `4.0`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "3.0" | "3.1" => Ok(Self::V3),
            "4.0" => Ok(Self::V4),
            _ => Err(SeedlinkError::InvalidCommand(format!(
                "unsupported protocol version: {s:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V3 => "3.1",
            Self::V4 => "4.0",
        }
    }

    /// True when this version unlocks extended framing and coded error replies.
    pub fn is_extended(&self) -> bool {
        *self == Self::V4
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
