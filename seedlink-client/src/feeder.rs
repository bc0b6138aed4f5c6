use seedlink4_protocol::{AuthMethod, Command, FrameFamily, Record};
use tracing::{debug, info, trace};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::state::{ClientConfig, ClientState};

/// Producing side of a SeedLink connection.
///
/// `Connected` → (optional `AUTH`) → `Feeding` after `FEED`. Records are then
/// written as binary frames; the server sends nothing back.
pub struct Feeder {
    connection: Connection,
    state: ClientState,
    sent: u64,
}

impl Feeder {
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        info!(addr, "feeder connecting");
        let connection = Connection::connect(addr, &config).await?;
        Ok(Self {
            connection,
            state: ClientState::Connected,
            sent: 0,
        })
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Records written so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Authenticate with `AUTH USERPASS`.
    pub async fn auth_userpass(&mut self, user: &str, password: &str) -> Result<()> {
        self.require_connected()?;
        debug!(user, "AUTH USERPASS");
        let cmd = Command::Auth {
            method: AuthMethod::UserPass {
                user: user.to_owned(),
                password: password.to_owned(),
            },
        };
        self.connection.request_ok(&cmd).await
    }

    /// Send `FEED`. On `OK` the connection carries records from here on.
    pub async fn feed(&mut self) -> Result<()> {
        self.require_connected()?;
        self.connection.request_ok(&Command::Feed).await?;
        self.state = ClientState::Feeding;
        info!("feeding");
        Ok(())
    }

    /// Frame `record` as `family` and send it.
    pub async fn send(&mut self, record: &Record, family: FrameFamily) -> Result<()> {
        self.send_buffered(record, family).await?;
        self.connection.flush().await
    }

    /// Like [`send`](Self::send) without flushing. Call [`flush`](Self::flush)
    /// or [`finish`](Self::finish) afterwards.
    pub async fn send_buffered(&mut self, record: &Record, family: FrameFamily) -> Result<()> {
        if self.state != ClientState::Feeding {
            return Err(ClientError::InvalidState {
                expected: "Feeding",
                actual: self.state.as_str(),
            });
        }
        self.connection.send_record(record, family).await?;
        self.sent += 1;
        trace!(%family, sequence = %record.sequence, "record sent");
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.connection.flush().await
    }

    /// Flush and close the write side. The server ends the feed on EOF.
    pub async fn finish(&mut self) -> Result<()> {
        self.connection.flush().await?;
        self.connection.shutdown().await?;
        debug!(sent = self.sent, "feed finished");
        self.state = ClientState::Disconnected;
        Ok(())
    }

    fn require_connected(&self) -> Result<()> {
        if self.state == ClientState::Connected {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                expected: "Connected",
                actual: self.state.as_str(),
            })
        }
    }
}
