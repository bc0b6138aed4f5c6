use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::FeedAccess;
use crate::error::Result;

/// What the fan-out does when a consumer's outbound queue is full.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Wait for room. A slow consumer slows down delivery from producers.
    Block,
    /// Discard the oldest queued record for that consumer.
    #[default]
    DropOldest,
}

/// Configuration for [`SeedLinkServer`](crate::SeedLinkServer).
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Software name reported in the HELLO banner. Default: `"SeedLink v4.0"`.
    pub software: String,
    /// Organization reported in the HELLO banner. Default: `"seedlink4-rs"`.
    pub organization: String,
    /// Idle timeout for command reads before streaming starts. Default: 60 s.
    pub handshake_timeout_secs: u64,
    /// Longest accepted command line, terminator included. Default: 200.
    pub max_line_len: usize,
    /// Largest declared payload accepted from a producer. Default: 10240.
    pub max_payload_len: usize,
    /// Outbound queue length per consumer. Default: 1024.
    pub queue_capacity: usize,
    /// Records kept per `(station, format)` for `DATA <seq>` resume.
    /// Default: 1024. Zero disables resume.
    pub ring_capacity: usize,
    pub queue_policy: QueuePolicy,
    pub feed_auth: FeedAccess,
    /// Answer `STATION` with `ERROR` for stations no producer has fed yet.
    pub reject_unknown_stations: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            software: "SeedLink v4.0".to_owned(),
            organization: "seedlink4-rs".to_owned(),
            handshake_timeout_secs: 60,
            max_line_len: 200,
            max_payload_len: seedlink4_protocol::frame::DEFAULT_MAX_PAYLOAD_LEN,
            queue_capacity: 1024,
            ring_capacity: 1024,
            queue_policy: QueuePolicy::default(),
            feed_auth: FeedAccess::default(),
            reject_unknown_stations: false,
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_payload_len, 10_240);
        assert_eq!(config.queue_policy, QueuePolicy::DropOldest);
        assert!(!config.feed_auth.required);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ServerConfig::from_json(
            r#"{
                "organization": "GFZ",
                "queue_policy": "block",
                "feed_auth": {
                    "required": true,
                    "users": { "sysop": "secret" },
                    "trusted_hosts": ["127.0.0.1"]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.organization, "GFZ");
        assert_eq!(config.software, "SeedLink v4.0");
        assert_eq!(config.queue_policy, QueuePolicy::Block);
        assert!(config.feed_auth.verify("sysop", "secret"));
        assert_eq!(config.feed_auth.trusted_hosts.len(), 1);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.ring_capacity, 1024);
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = ServerConfig::from_json(r#"{ "queue_policy": "sometimes" }"#).unwrap_err();
        assert!(matches!(err, crate::ServerError::Config(_)));
    }

    #[test]
    fn json_roundtrip() {
        let config = ServerConfig {
            reject_unknown_stations: true,
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);
    }
}
