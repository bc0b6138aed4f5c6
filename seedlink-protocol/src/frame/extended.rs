use crate::error::{Result, SeedlinkError};
use crate::frame::{PayloadFormat, Record, Signature, subformat_byte};
use crate::sequence::SequenceNumber;

pub const SIGNATURE: &[u8; 2] = b"SE";

/// SE2 header: 2 (sig) + 1 (format) + 1 (subformat) + 4 (payload len) + 8 (sequence).
pub const HEADER_LEN: usize = 16;

/// SE3 header before the station id bytes: SE2 header + 1 (station id len).
pub const SE3_HEADER_LEN: usize = 17;

/// Payload length declared in an extended header. `data` must hold at least 8 bytes.
pub(crate) fn declared_len(data: &[u8]) -> Result<usize> {
    let bytes: [u8; 4] = data
        .get(4..8)
        .and_then(|b| b.try_into().ok())
        .ok_or(SeedlinkError::FrameTooShort {
            expected: 8,
            actual: data.len(),
        })?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

/// Parse an SE2 or SE3 frame from the beginning of a buffer.
///
/// Returns `(record, bytes_consumed)`. The declared length counts payload
/// bytes only.
pub fn parse(data: &[u8]) -> Result<(Record, usize)> {
    if data.len() < HEADER_LEN {
        return Err(SeedlinkError::FrameTooShort {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }

    let Some(Signature::Extended { format, subformat }) = Signature::identify(data)? else {
        return Err(SeedlinkError::InvalidSignature(data[0..4].to_vec()));
    };

    let payload_len = declared_len(data)?;
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&data[8..16]);
    let sequence = SequenceNumber::from_le_bytes(seq_bytes)?;

    let (station_id, header_len) = match format {
        PayloadFormat::MiniSeed2 => (None, HEADER_LEN),
        PayloadFormat::MiniSeed3 => {
            if data.len() < SE3_HEADER_LEN {
                return Err(SeedlinkError::FrameTooShort {
                    expected: SE3_HEADER_LEN,
                    actual: data.len(),
                });
            }
            let id_len = data[HEADER_LEN] as usize;
            let header_len = SE3_HEADER_LEN + id_len;
            let id_bytes = data.get(SE3_HEADER_LEN..header_len).ok_or(
                SeedlinkError::FrameTooShort {
                    expected: header_len,
                    actual: data.len(),
                },
            )?;
            let id = std::str::from_utf8(id_bytes)
                .map_err(|_| SeedlinkError::InvalidStationId("not valid UTF-8".into()))?;
            (Some(id.to_owned()), header_len)
        }
    };

    let total_len = header_len + payload_len;
    if data.len() < total_len {
        return Err(SeedlinkError::FrameTooShort {
            expected: total_len,
            actual: data.len(),
        });
    }

    let record = Record::extended(
        format,
        subformat,
        sequence,
        station_id,
        data[header_len..total_len].to_vec(),
    );
    Ok((record, total_len))
}

/// Write an SE2 or SE3 frame. The station id is only written for SE3.
pub fn write(
    format: PayloadFormat,
    subformat: Option<crate::frame::PayloadSubformat>,
    sequence: SequenceNumber,
    station_id: Option<&str>,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let payload_len = u32::try_from(payload.len()).map_err(|_| SeedlinkError::PayloadTooLarge {
        declared: payload.len(),
        max: u32::MAX as usize,
    })?;

    let station_id_bytes = match format {
        PayloadFormat::MiniSeed2 => None,
        PayloadFormat::MiniSeed3 => Some(station_id.unwrap_or("").as_bytes()),
    };
    let header_len = match station_id_bytes {
        Some(id) => {
            if id.len() > u8::MAX as usize {
                return Err(SeedlinkError::InvalidStationId(format!(
                    "{} bytes exceeds 255",
                    id.len()
                )));
            }
            SE3_HEADER_LEN + id.len()
        }
        None => HEADER_LEN,
    };
    let total_len = header_len + payload.len();

    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(SIGNATURE);
    frame.push(format.to_byte());
    frame.push(subformat_byte(subformat));
    frame.extend_from_slice(&payload_len.to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    if let Some(id) = station_id_bytes {
        frame.push(id.len() as u8);
        frame.extend_from_slice(id);
    }
    frame.extend_from_slice(payload);

    debug_assert_eq!(frame.len(), total_len);
    Ok(frame)
}
