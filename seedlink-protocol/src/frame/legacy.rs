use crate::error::{Result, SeedlinkError};
use crate::frame::Record;
use crate::sequence::SequenceNumber;

pub const SIGNATURE: &[u8; 2] = b"SL";
pub const HEADER_LEN: usize = 8;
pub const PAYLOAD_LEN: usize = 512;
pub const FRAME_LEN: usize = 520;

/// Parse a legacy frame from the first 520 bytes of `data`.
pub fn parse(data: &[u8]) -> Result<Record> {
    if data.len() < FRAME_LEN {
        return Err(SeedlinkError::FrameTooShort {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }

    if &data[0..2] != SIGNATURE.as_slice() {
        return Err(SeedlinkError::InvalidSignature(data[0..2].to_vec()));
    }

    let hex_str = std::str::from_utf8(&data[2..HEADER_LEN])
        .map_err(|_| SeedlinkError::InvalidSequence("sequence bytes are not ASCII".into()))?;
    let sequence = SequenceNumber::from_legacy_hex(hex_str)?;

    Ok(Record::legacy(sequence, data[HEADER_LEN..FRAME_LEN].to_vec()))
}

/// Write a legacy frame (520 bytes). An undefined sequence is written as `FFFFFF`.
pub fn write(sequence: SequenceNumber, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() != PAYLOAD_LEN {
        return Err(SeedlinkError::PayloadLengthMismatch {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.extend_from_slice(SIGNATURE);
    frame.extend_from_slice(sequence.to_legacy_hex().as_bytes());
    frame.extend_from_slice(payload);

    debug_assert_eq!(frame.len(), FRAME_LEN);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFamily, PayloadFormat, PayloadSubformat};

    fn make_test_frame(seq_hex: &str, payload: &[u8; PAYLOAD_LEN]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_LEN);
        frame.extend_from_slice(b"SL");
        frame.extend_from_slice(seq_hex.as_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn parse_valid() {
        let payload = [0xAA_u8; PAYLOAD_LEN];
        let frame = make_test_frame("00001A", &payload);

        let record = parse(&frame).unwrap();
        assert_eq!(record.family, FrameFamily::Legacy);
        assert_eq!(record.format(), PayloadFormat::MiniSeed2);
        assert_eq!(record.subformat, Some(PayloadSubformat::Data));
        assert_eq!(record.sequence.value(), 26);
        assert_eq!(record.station_id, None);
        assert_eq!(record.payload, payload);
    }

    #[test]
    fn parse_undefined_sequence() {
        let frame = make_test_frame("FFFFFF", &[0u8; PAYLOAD_LEN]);
        assert!(parse(&frame).unwrap().sequence.is_undefined());
    }

    #[test]
    fn parse_wrong_signature() {
        let mut frame = make_test_frame("000001", &[0u8; PAYLOAD_LEN]);
        frame[1] = b'X';
        assert!(matches!(
            parse(&frame).unwrap_err(),
            SeedlinkError::InvalidSignature(_)
        ));
    }

    #[test]
    fn parse_bad_hex() {
        let frame = make_test_frame("00G01A", &[0u8; PAYLOAD_LEN]);
        assert!(matches!(
            parse(&frame).unwrap_err(),
            SeedlinkError::InvalidSequence(_)
        ));
    }

    #[test]
    fn parse_too_short() {
        let frame = make_test_frame("000001", &[0u8; PAYLOAD_LEN]);
        assert!(matches!(
            parse(&frame[..519]).unwrap_err(),
            SeedlinkError::FrameTooShort {
                expected: 520,
                actual: 519
            }
        ));
    }

    #[test]
    fn write_layout() {
        let payload = [0x42_u8; PAYLOAD_LEN];
        let frame = write(SequenceNumber::new(0xABC).unwrap(), &payload).unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[..8], b"SL000ABC");
        assert_eq!(&frame[8..], &payload[..]);
    }

    #[test]
    fn write_undefined_sequence() {
        let frame = write(SequenceNumber::UNDEFINED, &[0u8; PAYLOAD_LEN]).unwrap();
        assert_eq!(&frame[..8], b"SLFFFFFF");
    }

    #[test]
    fn write_wrong_payload_len() {
        assert!(matches!(
            write(SequenceNumber::new(0).unwrap(), &[0u8; 100]).unwrap_err(),
            SeedlinkError::PayloadLengthMismatch {
                expected: 512,
                actual: 100
            }
        ));
    }
}
