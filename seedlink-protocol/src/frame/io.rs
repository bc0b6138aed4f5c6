use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SeedlinkError};
use crate::frame::{FrameFamily, FrameSize, Record, decode, frame_size};

/// Read exactly one frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF between frames. EOF inside a frame is
/// [`SeedlinkError::Truncated`]. No resynchronization is attempted after a
/// framing fault.
pub async fn read_frame<R>(reader: &mut R, max_payload_len: usize) -> Result<Option<Record>>
where
    R: AsyncBufRead + Unpin,
{
    if reader.fill_buf().await?.is_empty() {
        return Ok(None);
    }

    let mut buf = Vec::with_capacity(crate::frame::legacy::FRAME_LEN);
    loop {
        let size = frame_size(&buf, max_payload_len)?;
        let needed = size.len();
        if buf.len() < needed {
            let start = buf.len();
            buf.resize(needed, 0);
            reader
                .read_exact(&mut buf[start..])
                .await
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => {
                        SeedlinkError::Truncated { expected: needed }
                    }
                    _ => SeedlinkError::Io(e),
                })?;
            continue;
        }
        if let FrameSize::Complete(_) = size {
            let (record, _) = decode(&buf)?;
            return Ok(Some(record));
        }
    }
}

/// Encode `record` as `family` and write it out.
pub async fn write_record<W>(writer: &mut W, record: &Record, family: FrameFamily) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = record.encode_as(family)?;
    writer.write_all(&frame).await?;
    Ok(())
}
