use futures_core::Stream;
use seedlink4_protocol::{
    AcceptCode, Command, DataStart, ProtocolVersion, Record, Response, SequenceNumber,
};
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::state::{ClientConfig, ClientState, ServerInfo};

/// Receiving side of a SeedLink connection.
///
/// Follows the consumer handshake: `Connected` → `Configured` (after
/// `STATION`) → `Streaming` (after `DATA` or `END`) → `Disconnected`.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> seedlink4_client::Result<()> {
/// use seedlink4_client::Consumer;
/// use seedlink4_protocol::ProtocolVersion;
///
/// let mut consumer = Consumer::connect("localhost:18000").await?;
/// consumer.slproto(ProtocolVersion::V4).await?;
/// consumer.station("WLF", "GE").await?;
/// consumer.data().await?;
///
/// while let Some(record) = consumer.next_record().await? {
///     println!("seq={} len={}", record.sequence, record.payload.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Consumer {
    connection: Connection,
    state: ClientState,
    version: ProtocolVersion,
    config: ClientConfig,
}

impl Consumer {
    /// Connect with default configuration. No command is sent yet.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        info!(addr, "consumer connecting");
        let connection = Connection::connect(addr, &config).await?;
        Ok(Self {
            connection,
            state: ClientState::Connected,
            version: ProtocolVersion::V3,
            config,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Protocol version confirmed by `SLPROTO`, [`ProtocolVersion::V3`] until then.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- Handshake (Connected|Configured) --

    /// Send `HELLO` and parse the two-line banner.
    pub async fn hello(&mut self) -> Result<ServerInfo> {
        self.require_state_in(&[ClientState::Connected, ClientState::Configured])?;
        self.connection.send_command(&Command::Hello).await?;

        let line1 = self.connection.read_line().await?;
        let line2 = self.connection.read_line().await?;
        match Response::parse_hello(&line1, &line2)? {
            Response::Hello {
                software,
                capabilities,
                organization,
            } => Ok(ServerInfo {
                software,
                organization,
                capabilities,
            }),
            other => Err(ClientError::UnexpectedResponse(format!(
                "expected HELLO banner, got {other:?}"
            ))),
        }
    }

    /// Negotiate the protocol version. Only valid before `STATION`.
    pub async fn slproto(&mut self, version: ProtocolVersion) -> Result<()> {
        self.require_state_in(&[ClientState::Connected])?;
        debug!(%version, "SLPROTO");
        self.connection
            .request_ok(&Command::SlProto { version })
            .await?;
        self.version = version;
        Ok(())
    }

    /// Declare which payload formats this consumer accepts.
    pub async fn accept(&mut self, codes: &[AcceptCode]) -> Result<()> {
        self.require_state_in(&[ClientState::Connected])?;
        let cmd = Command::Accept {
            codes: codes.to_vec(),
        };
        self.connection.request_ok(&cmd).await
    }

    pub async fn useragent(&mut self, description: &str) -> Result<()> {
        self.require_state_in(&[ClientState::Connected, ClientState::Configured])?;
        let cmd = Command::UserAgent {
            description: description.to_owned(),
        };
        self.connection.request_ok(&cmd).await
    }

    /// Scope the subscription to a station. Transitions to `Configured`.
    pub async fn station(&mut self, station: &str, network: &str) -> Result<()> {
        self.require_state_in(&[ClientState::Connected, ClientState::Configured])?;
        debug!(station, network, "STATION");
        let cmd = Command::Station {
            station: station.to_owned(),
            network: network.to_owned(),
        };
        self.connection.request_ok(&cmd).await?;
        self.state = ClientState::Configured;
        Ok(())
    }

    /// Add a selector to the current station scope.
    pub async fn select(&mut self, pattern: &str) -> Result<()> {
        self.require_state_in(&[ClientState::Configured])?;
        debug!(pattern, "SELECT");
        let cmd = Command::Select {
            pattern: pattern.to_owned(),
        };
        self.connection.request_ok(&cmd).await
    }

    /// Send `DATA`. On `OK` the server starts streaming live records.
    pub async fn data(&mut self) -> Result<()> {
        self.request_data(None).await
    }

    /// Send `DATA <seq>` to resume at `sequence`, inclusive.
    ///
    /// Records the server still holds from there are delivered before live
    /// ones. The token is hex in SLPROTO 3.x and decimal in 4.0.
    pub async fn data_from(&mut self, sequence: SequenceNumber) -> Result<()> {
        let start = DataStart::from_sequence(sequence, self.version);
        self.request_data(Some(start)).await
    }

    async fn request_data(&mut self, start: Option<DataStart>) -> Result<()> {
        self.require_state_in(&[ClientState::Configured])?;
        self.connection.request_ok(&Command::Data { start }).await?;
        self.state = ClientState::Streaming;
        info!(version = %self.version, "streaming");
        Ok(())
    }

    // -- Streaming --

    /// Read the next record.
    ///
    /// Returns `Ok(None)` once the server closes the connection between
    /// frames; the state is then `Disconnected`.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        self.require_state_in(&[ClientState::Streaming])?;
        match self.connection.read_record().await {
            Ok(Some(record)) => {
                let family = record.family.as_str();
                trace!(family, sequence = %record.sequence, "record received");
                Ok(Some(record))
            }
            Ok(None) => {
                debug!("server closed the stream");
                self.state = ClientState::Disconnected;
                Ok(None)
            }
            Err(e) => {
                if e.is_framing_fault() {
                    warn!(error = %e, "framing fault on stream");
                }
                Err(e)
            }
        }
    }

    /// Send `END`, the start-of-transfer marker. The server does not reply.
    ///
    /// After `STATION`/`SELECT` this starts streaming. While streaming it
    /// changes nothing; the stream continues until [`bye`](Self::bye) or EOF.
    pub async fn end(&mut self) -> Result<()> {
        self.require_state_in(&[ClientState::Configured, ClientState::Streaming])?;
        self.connection.send_command(&Command::End).await?;
        if self.state == ClientState::Configured {
            self.state = ClientState::Streaming;
            info!(version = %self.version, "streaming");
        }
        Ok(())
    }

    /// Send `BYE` and close. Valid in any state.
    pub async fn bye(&mut self) -> Result<()> {
        self.connection.send_command(&Command::Bye).await?;
        self.connection.shutdown().await.ok();
        self.state = ClientState::Disconnected;
        Ok(())
    }

    /// Consume this consumer and return a [`Stream`] of records.
    ///
    /// The consumer must be `Streaming`. The stream ends with `None` on EOF.
    pub fn into_stream(self) -> impl Stream<Item = Result<Record>> {
        crate::stream::record_stream(self)
    }

    fn require_state_in(&self, allowed: &[ClientState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let expected = match allowed {
            [ClientState::Connected] => "Connected",
            [ClientState::Connected, ClientState::Configured] => "Connected|Configured",
            [ClientState::Configured] => "Configured",
            [ClientState::Configured, ClientState::Streaming] => "Configured|Streaming",
            [ClientState::Streaming] => "Streaming",
            _ => "valid state",
        };
        Err(ClientError::InvalidState {
            expected,
            actual: self.state.as_str(),
        })
    }
}
