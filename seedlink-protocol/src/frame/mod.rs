//! Binary record framing.
//!
//! Every frame starts with a signature that selects its family:
//!
//! | Signature        | Family   | Layout                                              |
//! |------------------|----------|-----------------------------------------------------|
//! | `SL`             | legacy   | 6 hex sequence digits + 512-byte payload            |
//! | `SE2` + subfmt   | SE2      | u32 LE payload length + i64 LE sequence + payload   |
//! | `SE3` + subfmt   | SE3      | as SE2 + u8 station id length + station id + payload|
//!
//! Anything else is an unrecognized signature and a fatal framing fault.

pub mod extended;
pub mod io;
pub mod legacy;

pub use io::{read_frame, write_record};

use crate::error::{Result, SeedlinkError};
use crate::sequence::SequenceNumber;

/// Default upper bound for a declared extended payload length.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 10_240;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PayloadFormat {
    MiniSeed2,
    MiniSeed3,
}

impl PayloadFormat {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'2' => Ok(Self::MiniSeed2),
            b'3' => Ok(Self::MiniSeed3),
            _ => Err(SeedlinkError::InvalidPayloadFormat(b)),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::MiniSeed2 => b'2',
            Self::MiniSeed3 => b'3',
        }
    }

    /// Extended family that carries this format natively.
    pub fn extended_family(self) -> FrameFamily {
        match self {
            Self::MiniSeed2 => FrameFamily::Se2,
            Self::MiniSeed3 => FrameFamily::Se3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PayloadSubformat {
    Data,
    Event,
    Calibration,
    Timing,
    Log,
    Opaque,
}

impl PayloadSubformat {
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'D' => Ok(Self::Data),
            b'E' => Ok(Self::Event),
            b'C' => Ok(Self::Calibration),
            b'T' => Ok(Self::Timing),
            b'L' => Ok(Self::Log),
            b'O' => Ok(Self::Opaque),
            _ => Err(SeedlinkError::InvalidPayloadSubformat(b)),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Data => b'D',
            Self::Event => b'E',
            Self::Calibration => b'C',
            Self::Timing => b'T',
            Self::Log => b'L',
            Self::Opaque => b'O',
        }
    }
}

/// Wire byte for an optional subformat; `0` means unspecified.
pub(crate) fn subformat_byte(subformat: Option<PayloadSubformat>) -> u8 {
    subformat.map_or(0, PayloadSubformat::to_byte)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameFamily {
    Legacy,
    Se2,
    Se3,
}

impl FrameFamily {
    pub fn format(self) -> PayloadFormat {
        match self {
            Self::Legacy | Self::Se2 => PayloadFormat::MiniSeed2,
            Self::Se3 => PayloadFormat::MiniSeed3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Se2 => "SE2",
            Self::Se3 => "SE3",
        }
    }
}

impl std::fmt::Display for FrameFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded frame signature.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signature {
    Legacy,
    Extended {
        format: PayloadFormat,
        subformat: Option<PayloadSubformat>,
    },
}

impl Signature {
    /// Identify the signature at the start of `prefix`.
    ///
    /// Returns `Ok(None)` when more bytes are needed to decide.
    pub fn identify(prefix: &[u8]) -> Result<Option<Self>> {
        let unrecognized =
            || SeedlinkError::InvalidSignature(prefix[..prefix.len().min(4)].to_vec());

        match prefix {
            [] | [b'S'] => Ok(None),
            [b'S', b'L', ..] => Ok(Some(Self::Legacy)),
            [b'S', b'E'] | [b'S', b'E', _] => Ok(None),
            [b'S', b'E', f, s, ..] => {
                let format = PayloadFormat::from_byte(*f).map_err(|_| unrecognized())?;
                let subformat = match *s {
                    0 => None,
                    s => Some(PayloadSubformat::from_byte(s).map_err(|_| unrecognized())?),
                };
                Ok(Some(Self::Extended { format, subformat }))
            }
            _ => Err(unrecognized()),
        }
    }

    pub fn family(self) -> FrameFamily {
        match self {
            Self::Legacy => FrameFamily::Legacy,
            Self::Extended { format, .. } => format.extended_family(),
        }
    }
}

/// Progress of incremental frame sizing over a partially received buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameSize {
    /// At least this many bytes are needed before the size is known.
    Incomplete(usize),
    /// The whole frame is this many bytes.
    Complete(usize),
}

impl FrameSize {
    pub fn len(self) -> usize {
        match self {
            Self::Incomplete(n) | Self::Complete(n) => n,
        }
    }
}

/// Work out how many bytes the frame at the start of `buf` occupies.
///
/// `Incomplete(n)` is only returned while `buf.len() < n`.
pub fn frame_size(buf: &[u8], max_payload_len: usize) -> Result<FrameSize> {
    let Some(signature) = Signature::identify(buf)? else {
        return Ok(FrameSize::Incomplete(if buf.len() < 2 { 2 } else { 4 }));
    };

    match signature.family() {
        FrameFamily::Legacy => Ok(FrameSize::Complete(legacy::FRAME_LEN)),
        family => {
            if buf.len() < extended::HEADER_LEN {
                return Ok(FrameSize::Incomplete(extended::HEADER_LEN));
            }
            let payload_len = extended::declared_len(buf)?;
            if payload_len > max_payload_len {
                return Err(SeedlinkError::PayloadTooLarge {
                    declared: payload_len,
                    max: max_payload_len,
                });
            }
            if family == FrameFamily::Se2 {
                return Ok(FrameSize::Complete(extended::HEADER_LEN + payload_len));
            }
            if buf.len() < extended::SE3_HEADER_LEN {
                return Ok(FrameSize::Incomplete(extended::SE3_HEADER_LEN));
            }
            let station_id_len = buf[extended::HEADER_LEN] as usize;
            Ok(FrameSize::Complete(
                extended::SE3_HEADER_LEN + station_id_len + payload_len,
            ))
        }
    }
}

/// Decode one frame from the start of `buf`.
///
/// Returns the record and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(Record, usize)> {
    match Signature::identify(buf)? {
        Some(Signature::Legacy) => Ok((legacy::parse(buf)?, legacy::FRAME_LEN)),
        Some(Signature::Extended { .. }) => extended::parse(buf),
        None => Err(SeedlinkError::FrameTooShort {
            expected: 4,
            actual: buf.len(),
        }),
    }
}

/// A record as carried between producers and consumers.
///
/// The payload is opaque. `station_id` is only carried on the wire by SE3.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub family: FrameFamily,
    pub subformat: Option<PayloadSubformat>,
    pub sequence: SequenceNumber,
    pub station_id: Option<String>,
    pub payload: Vec<u8>,
}

impl Record {
    /// A legacy record. Legacy frames always carry miniSEED 2 data.
    pub fn legacy(sequence: SequenceNumber, payload: Vec<u8>) -> Self {
        Self {
            family: FrameFamily::Legacy,
            subformat: Some(PayloadSubformat::Data),
            sequence,
            station_id: None,
            payload,
        }
    }

    /// An extended record in the native family of `format`.
    ///
    /// A station id is kept for SE3 only; an empty one means none.
    pub fn extended(
        format: PayloadFormat,
        subformat: Option<PayloadSubformat>,
        sequence: SequenceNumber,
        station_id: Option<String>,
        payload: Vec<u8>,
    ) -> Self {
        let family = format.extended_family();
        let station_id = station_id.filter(|id| family == FrameFamily::Se3 && !id.is_empty());
        Self {
            family,
            subformat,
            sequence,
            station_id,
            payload,
        }
    }

    pub fn format(&self) -> PayloadFormat {
        self.family.format()
    }

    /// Encode in the record's own family.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_as(self.family)
    }

    /// Encode in `family`, re-framing when it differs from the record's own.
    ///
    /// Legacy framing needs a miniSEED 2 payload of exactly 512 bytes; the
    /// extended families need the payload format they are named after.
    pub fn encode_as(&self, family: FrameFamily) -> Result<Vec<u8>> {
        if family.format() != self.format() {
            return Err(SeedlinkError::Unrepresentable(family.as_str()));
        }
        match family {
            FrameFamily::Legacy => {
                if self.payload.len() != legacy::PAYLOAD_LEN {
                    return Err(SeedlinkError::Unrepresentable(family.as_str()));
                }
                legacy::write(self.sequence, &self.payload)
            }
            FrameFamily::Se2 | FrameFamily::Se3 => extended::write(
                self.format(),
                self.subformat,
                self.sequence,
                self.station_id.as_deref(),
                &self.payload,
            ),
        }
    }

    /// Whether this record can be framed as `family` at all.
    pub fn fits(&self, family: FrameFamily) -> bool {
        family.format() == self.format()
            && (family != FrameFamily::Legacy || self.payload.len() == legacy::PAYLOAD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: i64) -> SequenceNumber {
        SequenceNumber::new(n).unwrap()
    }

    #[test]
    fn identify_signatures() {
        assert_eq!(Signature::identify(b"").unwrap(), None);
        assert_eq!(Signature::identify(b"S").unwrap(), None);
        assert_eq!(Signature::identify(b"SE2").unwrap(), None);
        assert_eq!(Signature::identify(b"SL").unwrap(), Some(Signature::Legacy));
        assert_eq!(
            Signature::identify(b"SE3E").unwrap(),
            Some(Signature::Extended {
                format: PayloadFormat::MiniSeed3,
                subformat: Some(PayloadSubformat::Event),
            })
        );
        assert_eq!(
            Signature::identify(b"SE2\0").unwrap(),
            Some(Signature::Extended {
                format: PayloadFormat::MiniSeed2,
                subformat: None,
            })
        );
    }

    #[test]
    fn identify_rejects_unknown() {
        for bad in [&b"XY"[..], b"sl", b"SEJD", b"SE2Z", b"QQQQ"] {
            let err = Signature::identify(bad).unwrap_err();
            assert!(err.is_framing_fault(), "{bad:?}: {err}");
        }
    }

    #[test]
    fn frame_size_progression() {
        let record = Record::extended(
            PayloadFormat::MiniSeed3,
            Some(PayloadSubformat::Data),
            seq(7),
            Some("GE_WLF".into()),
            vec![1, 2, 3],
        );
        let bytes = record.encode().unwrap();
        let max = DEFAULT_MAX_PAYLOAD_LEN;

        assert_eq!(frame_size(&bytes[..1], max).unwrap(), FrameSize::Incomplete(2));
        assert_eq!(frame_size(&bytes[..3], max).unwrap(), FrameSize::Incomplete(4));
        assert_eq!(frame_size(&bytes[..10], max).unwrap(), FrameSize::Incomplete(16));
        assert_eq!(frame_size(&bytes[..16], max).unwrap(), FrameSize::Incomplete(17));
        assert_eq!(
            frame_size(&bytes[..17], max).unwrap(),
            FrameSize::Complete(bytes.len())
        );
        assert_eq!(frame_size(b"SL", max).unwrap(), FrameSize::Complete(520));
    }

    #[test]
    fn frame_size_rejects_oversized_payload() {
        let record = Record::extended(PayloadFormat::MiniSeed2, None, seq(0), None, vec![0; 64]);
        let bytes = record.encode().unwrap();
        assert!(matches!(
            frame_size(&bytes, 63).unwrap_err(),
            SeedlinkError::PayloadTooLarge {
                declared: 64,
                max: 63
            }
        ));
    }

    #[test]
    fn extended_constructor_normalizes_station_id() {
        let se2 = Record::extended(
            PayloadFormat::MiniSeed2,
            None,
            seq(0),
            Some("GE_WLF".into()),
            vec![],
        );
        assert_eq!(se2.station_id, None);

        let se3 = Record::extended(
            PayloadFormat::MiniSeed3,
            None,
            seq(0),
            Some(String::new()),
            vec![],
        );
        assert_eq!(se3.station_id, None);
    }

    #[test]
    fn reframe_legacy_to_se2() {
        let record = Record::legacy(seq(0x1A), vec![0x55; 512]);
        let se2 = record.encode_as(FrameFamily::Se2).unwrap();
        assert_eq!(&se2[..4], b"SE2D");

        let (back, consumed) = decode(&se2).unwrap();
        assert_eq!(consumed, se2.len());
        assert_eq!(back.family, FrameFamily::Se2);
        assert_eq!(back.sequence, record.sequence);
        assert_eq!(back.payload, record.payload);
    }

    #[test]
    fn reframe_unrepresentable() {
        let short = Record::extended(PayloadFormat::MiniSeed2, None, seq(1), None, vec![0; 100]);
        assert!(!short.fits(FrameFamily::Legacy));
        assert!(matches!(
            short.encode_as(FrameFamily::Legacy).unwrap_err(),
            SeedlinkError::Unrepresentable("legacy")
        ));

        let ms3 = Record::extended(PayloadFormat::MiniSeed3, None, seq(1), None, vec![0; 512]);
        assert!(!ms3.fits(FrameFamily::Legacy));
        assert!(!ms3.fits(FrameFamily::Se2));
        assert!(ms3.fits(FrameFamily::Se3));
    }

    #[test]
    fn decode_needs_signature() {
        assert!(matches!(
            decode(b"SE").unwrap_err(),
            SeedlinkError::FrameTooShort { .. }
        ));
    }
}
