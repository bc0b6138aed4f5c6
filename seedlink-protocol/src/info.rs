//! `INFO` levels and the frames that carry INFO documents.
//!
//! SLPROTO 4.0 sessions get one `SEJ` frame (format `J`, subformat `I` or
//! `E`) holding the whole document. Older sessions get the document split
//! into 512-byte `SLINFO` frames: `SLINFO *` while more follow, `SLINFO  `
//! on the last one, NUL-padded.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{Result, SeedlinkError};
use crate::frame::{extended, legacy};
use crate::version::ProtocolVersion;

const LEGACY_MORE: &[u8; 8] = b"SLINFO *";
const LEGACY_LAST: &[u8; 8] = b"SLINFO  ";

/// Detail requested by `INFO`. Each level includes everything below it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InfoLevel {
    /// Server identification.
    Id,
    /// Payload formats the server carries (SLPROTO 4.0 only).
    Formats,
    /// Server capabilities (SLPROTO 4.0 only).
    Capabilities,
    /// Station list with sequence ranges.
    Stations,
    /// Station list with per-format streams.
    Streams,
    /// Everything above plus the open connections.
    Connections,
}

impl InfoLevel {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ID" => Ok(Self::Id),
            "FORMATS" => Ok(Self::Formats),
            "CAPABILITIES" => Ok(Self::Capabilities),
            "STATIONS" => Ok(Self::Stations),
            "STREAMS" => Ok(Self::Streams),
            "CONNECTIONS" => Ok(Self::Connections),
            _ => Err(SeedlinkError::InvalidCommand(format!(
                "INFO: unsupported level {s:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Formats => "FORMATS",
            Self::Capabilities => "CAPABILITIES",
            Self::Stations => "STATIONS",
            Self::Streams => "STREAMS",
            Self::Connections => "CONNECTIONS",
        }
    }

    /// Check if this level can be requested in a session speaking `version`.
    pub fn is_valid_for(&self, version: ProtocolVersion) -> bool {
        match self {
            Self::Formats | Self::Capabilities => version.is_extended(),
            _ => true,
        }
    }
}

impl std::fmt::Display for InfoLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an INFO frame answers the request or reports an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InfoKind {
    Info,
    Error,
}

impl InfoKind {
    fn to_byte(self) -> u8 {
        match self {
            Self::Info => b'I',
            Self::Error => b'E',
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'I' => Ok(Self::Info),
            b'E' => Ok(Self::Error),
            _ => Err(SeedlinkError::InvalidPayloadSubformat(b)),
        }
    }
}

/// An INFO document as received from the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoDocument {
    pub kind: InfoKind,
    pub body: Vec<u8>,
}

/// Frame `body` as one `SEJ` frame. The sequence field is always 0.
pub fn encode_extended(kind: InfoKind, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(extended::HEADER_LEN + body.len());
    frame.extend_from_slice(extended::SIGNATURE);
    frame.push(b'J');
    frame.push(kind.to_byte());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&0i64.to_le_bytes());
    frame.extend_from_slice(body);
    frame
}

/// Split `body` into legacy `SLINFO` frames.
///
/// An empty body still yields one (all-NUL) frame.
pub fn encode_legacy(body: &[u8]) -> Vec<u8> {
    let chunks: Vec<&[u8]> = if body.is_empty() {
        vec![body]
    } else {
        body.chunks(legacy::PAYLOAD_LEN).collect()
    };

    let mut out = Vec::with_capacity(chunks.len() * legacy::FRAME_LEN);
    for (i, chunk) in chunks.iter().enumerate() {
        let header = if i + 1 == chunks.len() { LEGACY_LAST } else { LEGACY_MORE };
        out.extend_from_slice(header);
        out.extend_from_slice(chunk);
        out.resize(out.len() + legacy::PAYLOAD_LEN - chunk.len(), 0);
    }
    out
}

/// Read one INFO document in either framing.
///
/// Returns `Ok(None)` on a clean EOF before the first byte.
pub async fn read_info<R>(reader: &mut R, max_len: usize) -> Result<Option<InfoDocument>>
where
    R: AsyncBufRead + Unpin,
{
    if reader.fill_buf().await?.is_empty() {
        return Ok(None);
    }

    let mut head = [0u8; 8];
    read_exact(reader, &mut head).await?;

    if head.starts_with(b"SEJ") {
        let kind = InfoKind::from_byte(head[3])?;
        let len = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
        if len > max_len {
            return Err(SeedlinkError::PayloadTooLarge {
                declared: len,
                max: max_len,
            });
        }
        let mut rest = vec![0u8; 8 + len];
        read_exact(reader, &mut rest).await?;
        rest.drain(..8);
        return Ok(Some(InfoDocument { kind, body: rest }));
    }

    let mut body = Vec::new();
    loop {
        let last = if &head == LEGACY_LAST {
            true
        } else if &head == LEGACY_MORE {
            false
        } else {
            return Err(SeedlinkError::InvalidSignature(head[..4].to_vec()));
        };
        let mut chunk = [0u8; legacy::PAYLOAD_LEN];
        read_exact(reader, &mut chunk).await?;
        body.extend_from_slice(&chunk);
        if body.len() > max_len {
            return Err(SeedlinkError::PayloadTooLarge {
                declared: body.len(),
                max: max_len,
            });
        }
        if last {
            break;
        }
        read_exact(reader, &mut head).await?;
    }
    let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    body.truncate(end);
    Ok(Some(InfoDocument {
        kind: InfoKind::Info,
        body,
    }))
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let expected = buf.len();
    reader.read_exact(buf).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => SeedlinkError::Truncated { expected },
        _ => SeedlinkError::Io(e),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[test]
    fn parse_levels() {
        assert_eq!(InfoLevel::parse("ID").unwrap(), InfoLevel::Id);
        assert_eq!(InfoLevel::parse("stations").unwrap(), InfoLevel::Stations);
        assert_eq!(InfoLevel::parse("Connections").unwrap(), InfoLevel::Connections);
        assert!(InfoLevel::parse("GAPS").is_err());
        assert!(InfoLevel::parse("").is_err());
    }

    #[test]
    fn levels_are_cumulative() {
        assert!(InfoLevel::Id < InfoLevel::Stations);
        assert!(InfoLevel::Streams > InfoLevel::Stations);
        assert!(InfoLevel::Connections > InfoLevel::Streams);
    }

    #[test]
    fn version_validity() {
        assert!(InfoLevel::Id.is_valid_for(ProtocolVersion::V3));
        assert!(InfoLevel::Connections.is_valid_for(ProtocolVersion::V3));
        assert!(!InfoLevel::Formats.is_valid_for(ProtocolVersion::V3));
        assert!(InfoLevel::Capabilities.is_valid_for(ProtocolVersion::V4));
    }

    #[test]
    fn extended_header_layout() {
        let frame = encode_extended(InfoKind::Error, b"{}");
        assert_eq!(&frame[..4], b"SEJE");
        assert_eq!(&frame[4..8], &2u32.to_le_bytes());
        assert_eq!(&frame[8..16], &[0; 8]);
        assert_eq!(&frame[16..], b"{}");
    }

    #[test]
    fn legacy_chunks_mark_continuation() {
        let body = vec![b'x'; 600];
        let frames = encode_legacy(&body);
        assert_eq!(frames.len(), 2 * legacy::FRAME_LEN);
        assert_eq!(&frames[..8], b"SLINFO *");
        assert_eq!(&frames[520..528], b"SLINFO  ");
        assert_eq!(frames[528 + 87], b'x');
        assert_eq!(frames[528 + 88], 0);
    }

    #[tokio::test]
    async fn read_either_framing() {
        let body = br#"{"software":"SeedLink v4.0"}"#;

        let wire = encode_extended(InfoKind::Info, body);
        let mut reader = BufReader::new(wire.as_slice());
        let doc = read_info(&mut reader, 4096).await.unwrap().unwrap();
        assert_eq!(doc.kind, InfoKind::Info);
        assert_eq!(doc.body, body);

        let long = vec![b'a'; 700];
        let wire = encode_legacy(&long);
        let mut reader = BufReader::new(wire.as_slice());
        let doc = read_info(&mut reader, 4096).await.unwrap().unwrap();
        assert_eq!(doc.body, long);
        assert!(read_info(&mut reader, 4096).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_frame_is_not_info() {
        let mut wire = b"SL000001".to_vec();
        wire.resize(legacy::FRAME_LEN, 0);
        let mut reader = BufReader::new(wire.as_slice());
        assert!(matches!(
            read_info(&mut reader, 4096).await,
            Err(SeedlinkError::InvalidSignature(_))
        ));
    }
}
