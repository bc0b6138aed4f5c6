use std::time::Duration;

use seedlink4_protocol::frame::DEFAULT_MAX_PAYLOAD_LEN;

/// Client connection state.
///
/// Consumers move `Connected` → `Configured` → `Streaming`; feeders move
/// `Connected` → `Feeding`. Both end in `Disconnected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// TCP connected; handshake commands allowed.
    Connected,
    /// A STATION scope is set; SELECT and DATA allowed.
    Configured,
    /// Binary records are arriving.
    Streaming,
    /// Binary records are being sent.
    Feeding,
    /// Connection closed.
    Disconnected,
}

impl ClientState {
    /// Returns the state name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Configured => "Configured",
            Self::Streaming => "Streaming",
            Self::Feeding => "Feeding",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// Configuration for [`Consumer`](crate::Consumer) and [`Feeder`](crate::Feeder) connections.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Timeout for the initial TCP connection. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Timeout for individual reads (lines and frames). Default: 60 seconds.
    pub read_timeout: Duration,
    /// Largest payload accepted in a received frame. Default: 10240.
    pub max_payload_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Information about the connected SeedLink server, parsed from HELLO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server software and version (e.g., `"SeedLink v4.0"`).
    pub software: String,
    /// Server organization line.
    pub organization: String,
    /// Advertised capabilities (e.g., `["SLPROTO:4.0", "CAP:AUTH:USERPASS"]`).
    pub capabilities: Vec<String>,
}

impl ServerInfo {
    /// True if the server advertises `SLPROTO:4.0`.
    pub fn supports_v4(&self) -> bool {
        self.capabilities.iter().any(|c| c == "SLPROTO:4.0")
    }
}
