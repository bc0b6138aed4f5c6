use crate::error::{Result, SeedlinkError};

/// Signed 64-bit record sequence number. `-1` means "not yet assigned".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceNumber(i64);

impl SequenceNumber {
    /// Sentinel: sequence not assigned.
    pub const UNDEFINED: Self = Self(-1);

    /// Legacy frames carry 6 hex digits; `FFFFFF` is reserved for [`Self::UNDEFINED`].
    pub const LEGACY_MODULUS: i64 = 0xFF_FFFF;

    const LEGACY_UNDEFINED_HEX: &'static str = "FFFFFF";

    /// Create a sequence number. Values below `-1` are rejected.
    pub fn new(value: i64) -> Result<Self> {
        if value < -1 {
            return Err(SeedlinkError::InvalidSequence(format!(
                "sequence below -1: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_undefined(self) -> bool {
        self == Self::UNDEFINED
    }

    /// Next sequence in order. Undefined advances to 0.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Parse the 6-digit hex field of a legacy frame.
    pub fn from_legacy_hex(hex: &str) -> Result<Self> {
        if hex.len() != 6 {
            return Err(SeedlinkError::InvalidSequence(format!(
                "legacy hex must be 6 chars, got {} ({hex:?})",
                hex.len()
            )));
        }
        if hex.eq_ignore_ascii_case(Self::LEGACY_UNDEFINED_HEX) {
            return Ok(Self::UNDEFINED);
        }
        let value = i64::from_str_radix(hex, 16)
            .map_err(|_| SeedlinkError::InvalidSequence(format!("invalid legacy hex: {hex:?}")))?;
        Ok(Self(value))
    }

    /// Serialize to 6 uppercase hex digits, wrapping defined values into the legacy range.
    pub fn to_legacy_hex(self) -> String {
        if self.is_undefined() {
            return Self::LEGACY_UNDEFINED_HEX.to_string();
        }
        format!("{:06X}", self.0 % Self::LEGACY_MODULUS)
    }

    /// Parse from the little-endian bytes of an extended frame header.
    pub fn from_le_bytes(bytes: [u8; 8]) -> Result<Self> {
        Self::new(i64::from_le_bytes(bytes))
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_undefined() {
            write!(f, "UNDEFINED")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
