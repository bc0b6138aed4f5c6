use std::time::Duration;

use seedlink4_protocol::frame::{read_frame, write_record};
use seedlink4_protocol::{Command, FrameFamily, Record, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};
use crate::state::ClientConfig;

pub(crate) struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    read_timeout: Duration,
    max_payload_len: usize,
}

impl Connection {
    pub async fn connect(addr: &str, config: &ClientConfig) -> Result<Self> {
        debug!(addr, "TCP connecting");
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout(config.connect_timeout))?
            .map_err(ClientError::Io)?;

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            read_timeout: config.read_timeout,
            max_payload_len: config.max_payload_len,
        })
    }

    pub async fn send_command(&mut self, cmd: &Command) -> Result<()> {
        trace!(command = cmd.name(), "sending");
        self.send_raw(&cmd.to_bytes()).await
    }

    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write one record without flushing.
    pub async fn send_record(&mut self, record: &Record, family: FrameFamily) -> Result<()> {
        write_record(&mut self.writer, record, family).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.read_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.read_timeout, "read timeout");
                ClientError::Timeout(self.read_timeout)
            })??;
        if n == 0 {
            return Err(ClientError::Disconnected);
        }
        Ok(line)
    }

    /// Send a command and read its one-line reply.
    pub async fn request(&mut self, cmd: &Command) -> Result<Response> {
        self.send_command(cmd).await?;
        let line = self.read_line().await?;
        Ok(Response::parse_line(&line)?)
    }

    /// Send a command and require `OK`.
    pub async fn request_ok(&mut self, cmd: &Command) -> Result<()> {
        match self.request(cmd).await? {
            Response::Ok => Ok(()),
            Response::Error { code, description } => {
                let msg = match code {
                    Some(c) => format!("{}: {} {description}", cmd.name(), c.as_str()),
                    None => format!("{}: {description}", cmd.name()),
                };
                Err(ClientError::ServerError(msg))
            }
            other => Err(ClientError::UnexpectedResponse(format!(
                "expected OK for {}, got {other:?}",
                cmd.name()
            ))),
        }
    }

    /// Read the next frame, or `None` on a clean EOF between frames.
    pub async fn read_record(&mut self) -> Result<Option<Record>> {
        tokio::time::timeout(
            self.read_timeout,
            read_frame(&mut self.reader, self.max_payload_len),
        )
        .await
        .map_err(|_| ClientError::Timeout(self.read_timeout))?
        .map_err(ClientError::from)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
