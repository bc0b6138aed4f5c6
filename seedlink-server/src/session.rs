use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use seedlink4_protocol::info::{self as info_frame, InfoKind};
use seedlink4_protocol::response::ErrorCode;
use seedlink4_protocol::{Command, InfoLevel, ProtocolVersion, Response};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::connections::{ConnectionGuard, ConnectionRegistry};
use crate::dispatcher::{self, OutboundQueue, StreamPlan};
use crate::error::{Result, ServerError};
use crate::fanout::FanOut;
use crate::handshake::{Action, Context, Negotiator};
use crate::info::{self, InfoSource};
use crate::ingest::{Gateway, StationCatalog};
use crate::store::RecordStore;

/// Server state every connection task gets a handle to.
#[derive(Clone)]
pub(crate) struct Shared {
    pub config: Arc<ServerConfig>,
    pub fanout: FanOut,
    pub catalog: Arc<StationCatalog>,
    pub gateway: Gateway,
    pub store: RecordStore,
    pub connections: ConnectionRegistry,
    pub started: SystemTime,
}

/// How a consumer left the streaming phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Bye,
    Eof,
    Shutdown,
}

/// Per-client connection, run as a spawned tokio task.
pub(crate) struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    peer: SocketAddr,
    shared: Shared,
    negotiator: Negotiator,
    listed: ConnectionGuard,
    shutdown_rx: watch::Receiver<bool>,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        shared: Shared,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let listed = shared.connections.register(peer);
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer,
            shared,
            negotiator: Negotiator::new(),
            listed,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        let peer = self.peer;
        info!(%peer, "client connected");
        match self.serve().await {
            Ok(()) => {}
            Err(e) if e.is_framing_fault() => {
                warn!(%peer, error = %e, "framing fault, closing connection");
            }
            Err(e) => debug!(%peer, error = %e, "connection error"),
        }
        info!(
            %peer,
            state = ?self.negotiator.state(),
            user_agent = self.negotiator.user_agent().unwrap_or("-"),
            "client disconnected"
        );
    }

    /// Command loop. Returns once the connection should close.
    async fn serve(&mut self) -> Result<()> {
        let timeout = self.shared.config.handshake_timeout();
        let max_line_len = self.shared.config.max_line_len;

        loop {
            let read = read_command_line(&mut self.reader, max_line_len);
            let line = tokio::select! {
                result = tokio::time::timeout(timeout, read) => {
                    match result {
                        Ok(line) => line?,
                        Err(_) => {
                            debug!(peer = %self.peer, ?timeout, "handshake timed out");
                            return Ok(());
                        }
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    debug!("shutdown received during command loop");
                    return Ok(());
                }
            };

            let Some(line) = line else {
                return Ok(()); // client disconnected
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let action = match Command::parse(trimmed) {
                Ok(cmd) => {
                    debug!(command = cmd.name(), "received command");
                    let ctx = Context {
                        config: &self.shared.config,
                        peer: self.peer.ip(),
                        catalog: &self.shared.catalog,
                    };
                    self.negotiator.handle(cmd, &ctx)
                }
                Err(e) => {
                    debug!(line = trimmed, error = %e, "invalid command");
                    Action::Reply(self.negotiator.reject(&e))
                }
            };
            self.publish_state();

            match action {
                Action::Reply(resp) => self.send_response(&resp).await?,
                Action::Close(resp) => {
                    if let Some(resp) = resp {
                        self.send_response(&resp).await?;
                    }
                    return Ok(());
                }
                Action::Info { level, version } => self.send_info(level, version).await?,
                Action::InfoError {
                    version,
                    code,
                    message,
                } => self.send_info_error(version, code, &message).await?,
                Action::Stream { plan, reply } => return self.stream(plan, reply).await,
                Action::Feed => return self.feed().await,
            }
        }
    }

    /// Mirror the negotiator into the connection registry.
    fn publish_state(&self) {
        let protocol = self.negotiator.version();
        let state = self.negotiator.state().as_str();
        let user_agent = self.negotiator.user_agent().map(str::to_owned);
        self.listed.update(|c| {
            c.protocol = Some(protocol);
            c.state = state;
            c.user_agent = user_agent;
        });
    }

    fn info_source(&self) -> InfoSource<'_> {
        InfoSource {
            config: &self.shared.config,
            started: self.shared.started,
            catalog: &self.shared.catalog,
            store: &self.shared.store,
            connections: &self.shared.connections,
        }
    }

    async fn send_info(&mut self, level: InfoLevel, version: ProtocolVersion) -> Result<()> {
        let body = info::build(level, version, &self.info_source())?;
        debug!(peer = %self.peer, %level, len = body.len(), "INFO sent");
        self.send_info_frames(version, InfoKind::Info, &body).await
    }

    async fn send_info_error(
        &mut self,
        version: ProtocolVersion,
        code: ErrorCode,
        message: &str,
    ) -> Result<()> {
        let body = info::build_error(code, message, &self.info_source())?;
        debug!(peer = %self.peer, code = code.as_str(), message, "INFO error sent");
        self.send_info_frames(version, InfoKind::Error, &body).await
    }

    async fn send_info_frames(
        &mut self,
        version: ProtocolVersion,
        kind: InfoKind,
        body: &[u8],
    ) -> Result<()> {
        let frames = if version.is_extended() {
            info_frame::encode_extended(kind, body)
        } else {
            info_frame::encode_legacy(body)
        };
        self.writer.write_all(&frames).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Deliver matching records until the consumer leaves.
    ///
    /// Only `BYE`, EOF or shutdown end the stream. `END` while streaming is
    /// a start-of-transfer marker and changes nothing.
    async fn stream(&mut self, plan: StreamPlan, reply: Option<Response>) -> Result<()> {
        let plan = Arc::new(plan);
        let queue = Arc::new(OutboundQueue::new(
            self.shared.config.queue_capacity,
            self.shared.config.queue_policy,
        ));
        // Registered before the backlog is read and before the reply, so no
        // record falls between the two.
        let registration = self
            .shared
            .fanout
            .register(self.peer, plan.clone(), queue.clone());
        let backlog = match plan.start {
            Some(start) => self.shared.store.read_from(start, &plan),
            None => Vec::new(),
        };
        if let Some(reply) = reply {
            self.send_response(&reply).await?;
        }
        info!(
            peer = %self.peer,
            extended = plan.extended,
            start = ?plan.start,
            backlog = backlog.len(),
            "streaming started"
        );

        let max_line_len = self.shared.config.max_line_len;
        let termination = {
            let worker = dispatcher::drain(&queue, &plan, backlog, &mut self.writer);
            tokio::pin!(worker);

            let termination = tokio::select! {
                result = &mut worker => {
                    // The queue only closes through the registration, so this
                    // is a write failure.
                    return result;
                }
                result = watch_termination(&mut self.reader, max_line_len) => result?,
                _ = self.shutdown_rx.changed() => Termination::Shutdown,
            };

            // Discard whatever is still queued and let the worker finish its frame.
            drop(registration);
            worker.await?;
            termination
        };

        info!(peer = %self.peer, ?termination, "streaming ended");
        Ok(())
    }

    /// Hand the rest of the connection to the ingest gateway.
    async fn feed(&mut self) -> Result<()> {
        self.send_response(&Response::Ok).await?;
        info!(peer = %self.peer, "feed started");

        let published = self
            .shared
            .gateway
            .run(&mut self.reader, self.peer, &mut self.shutdown_rx)
            .await?;

        info!(peer = %self.peer, published, "feed ended");
        Ok(())
    }

    async fn send_response(&mut self, resp: &Response) -> Result<()> {
        self.writer.write_all(&resp.to_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Read one command line of at most `max_len` bytes.
///
/// Returns `None` on EOF. A line that does not end within `max_len` bytes is
/// [`ServerError::LineTooLong`].
async fn read_command_line<R>(reader: &mut R, max_len: usize) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(max_len as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n >= max_len && buf.last() != Some(&b'\n') {
        return Err(ServerError::LineTooLong(max_len));
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Watch a streaming consumer's inbound side for `BYE` or EOF.
///
/// Anything else, `END` included, is discarded without being parsed as a
/// command.
async fn watch_termination<R>(reader: &mut R, max_line_len: usize) -> Result<Termination>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_command_line(reader, max_line_len).await {
            Ok(None) => return Ok(Termination::Eof),
            Ok(Some(line)) => match line.trim() {
                "BYE" => return Ok(Termination::Bye),
                other => trace!(line = other, "input discarded while streaming"),
            },
            Err(ServerError::LineTooLong(_)) => {
                trace!("overlong input discarded while streaming");
            }
            Err(e) => return Err(e),
        }
    }
}
