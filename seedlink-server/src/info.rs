//! JSON generation for SeedLink INFO responses.
//!
//! Levels are cumulative: `STATIONS` includes the `ID` fields, `STREAMS`
//! adds per-format ranges to each station, `CONNECTIONS` adds the
//! connection list.

use std::collections::BTreeMap;
use std::time::SystemTime;

use seedlink4_protocol::response::ErrorCode;
use seedlink4_protocol::{InfoLevel, PayloadFormat, ProtocolVersion};
use serde::Serialize;

use crate::config::ServerConfig;
use crate::connections::ConnectionRegistry;
use crate::error::{Result, ServerError};
use crate::handshake::CAPABILITIES;
use crate::ingest::StationCatalog;
use crate::store::RecordStore;

/// Server state an INFO document is built from.
pub(crate) struct InfoSource<'a> {
    pub config: &'a ServerConfig,
    pub started: SystemTime,
    pub catalog: &'a StationCatalog,
    pub store: &'a RecordStore,
    pub connections: &'a ConnectionRegistry,
}

#[derive(Serialize)]
struct Document<'a> {
    software: &'a str,
    organization: &'a str,
    started: String,
    capability: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<BTreeMap<char, &'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    station: Option<Vec<Station>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection: Option<Vec<Connection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Failure>,
}

#[derive(Serialize)]
struct Station {
    name: String,
    network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    begin_seq: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_seq: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<Vec<Stream>>,
}

#[derive(Serialize)]
struct Stream {
    format: char,
    begin_seq: i64,
    end_seq: i64,
}

#[derive(Serialize)]
struct Connection {
    host: String,
    port: u16,
    ctime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    proto: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    useragent: Option<String>,
    state: &'static str,
}

#[derive(Serialize)]
struct Failure {
    code: &'static str,
    message: String,
}

fn mime_type(format: PayloadFormat) -> &'static str {
    match format {
        PayloadFormat::MiniSeed2 => "application/vnd.fdsn.mseed",
        PayloadFormat::MiniSeed3 => "application/vnd.fdsn.mseed3",
    }
}

fn header<'a>(source: &InfoSource<'a>) -> Document<'a> {
    Document {
        software: &source.config.software,
        organization: &source.config.organization,
        started: format_timestamp(source.started),
        capability: &CAPABILITIES,
        format: None,
        station: None,
        connection: None,
        error: None,
    }
}

/// Build the document for `level`.
pub(crate) fn build(
    level: InfoLevel,
    version: ProtocolVersion,
    source: &InfoSource<'_>,
) -> Result<Vec<u8>> {
    let mut doc = header(source);

    if level >= InfoLevel::Formats && version.is_extended() {
        let formats = [PayloadFormat::MiniSeed2, PayloadFormat::MiniSeed3];
        doc.format = Some(
            formats
                .into_iter()
                .map(|f| (f.to_byte() as char, mime_type(f)))
                .collect(),
        );
    }

    if level >= InfoLevel::Stations {
        let ranges = source.store.ranges();
        let stations = source
            .catalog
            .stations()
            .into_iter()
            .map(|key| {
                let own: Vec<_> = ranges.iter().filter(|r| r.key == key).collect();
                let streams = (level >= InfoLevel::Streams).then(|| {
                    own.iter()
                        .map(|r| Stream {
                            format: r.format.to_byte() as char,
                            begin_seq: r.begin.value(),
                            end_seq: r.end.value(),
                        })
                        .collect()
                });
                Station {
                    begin_seq: own.iter().map(|r| r.begin.value()).min(),
                    end_seq: own.iter().map(|r| r.end.value()).max(),
                    stream: streams,
                    name: key.station,
                    network: key.network,
                }
            })
            .collect();
        doc.station = Some(stations);
    }

    if level >= InfoLevel::Connections {
        let connections = source
            .connections
            .snapshot()
            .into_iter()
            .map(|c| Connection {
                host: c.addr.ip().to_string(),
                port: c.addr.port(),
                ctime: format_timestamp(c.connected_at),
                proto: c.protocol.map(|v| v.as_str()),
                useragent: c.user_agent,
                state: c.state,
            })
            .collect();
        doc.connection = Some(connections);
    }

    serde_json::to_vec(&doc).map_err(ServerError::Info)
}

/// Build an error document.
pub(crate) fn build_error(
    code: ErrorCode,
    message: impl Into<String>,
    source: &InfoSource<'_>,
) -> Result<Vec<u8>> {
    let mut doc = header(source);
    doc.error = Some(Failure {
        code: code.as_str(),
        message: message.into(),
    });
    serde_json::to_vec(&doc).map_err(ServerError::Info)
}

/// Format a SystemTime as `YYYY-MM-DDTHH:MM:SSZ` (UTC) without chrono.
pub(crate) fn format_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    let (days, rem) = (secs.div_euclid(86_400), secs.rem_euclid(86_400));

    // Civil date from days since 1970-01-01 (proleptic Gregorian).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Published;
    use crate::identity::StationKey;
    use crate::identity::tests::mseed2_payload;
    use seedlink4_protocol::{Record, SequenceNumber};
    use serde_json::Value;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        config: ServerConfig,
        catalog: StationCatalog,
        store: RecordStore,
        connections: ConnectionRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: ServerConfig::default(),
                catalog: StationCatalog::default(),
                store: RecordStore::new(8),
                connections: ConnectionRegistry::new(),
            }
        }

        fn source(&self) -> InfoSource<'_> {
            InfoSource {
                config: &self.config,
                started: SystemTime::UNIX_EPOCH + Duration::from_secs(1_760_000_000),
                catalog: &self.catalog,
                store: &self.store,
                connections: &self.connections,
            }
        }

        fn feed(&self, station: &str, seq: i64) {
            let key = StationKey::new("GE", station);
            self.catalog.insert(&key);
            self.store.push(Arc::new(Published {
                key,
                record: Record::legacy(
                    SequenceNumber::new(seq).unwrap(),
                    mseed2_payload("GE", station),
                ),
            }));
        }

        fn json(&self, level: InfoLevel, version: ProtocolVersion) -> Value {
            serde_json::from_slice(&build(level, version, &self.source()).unwrap()).unwrap()
        }
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(SystemTime::UNIX_EPOCH), "1970-01-01T00:00:00Z");
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(951_782_400 + 3_723);
        assert_eq!(format_timestamp(t), "2000-02-29T01:02:03Z");
    }

    #[test]
    fn id_has_identity_only() {
        let fx = Fixture::new();
        fx.feed("WLF", 0);
        let doc = fx.json(InfoLevel::Id, ProtocolVersion::V4);
        assert_eq!(doc["software"], "SeedLink v4.0");
        assert_eq!(doc["organization"], "seedlink4-rs");
        assert_eq!(doc["started"], "2025-10-09T08:53:20Z");
        assert!(doc.get("station").is_none());
        assert!(doc.get("format").is_none());
    }

    #[test]
    fn formats_only_for_extended_sessions() {
        let fx = Fixture::new();
        let doc = fx.json(InfoLevel::Formats, ProtocolVersion::V4);
        assert_eq!(doc["format"]["2"], "application/vnd.fdsn.mseed");
        assert_eq!(doc["format"]["3"], "application/vnd.fdsn.mseed3");

        let doc = fx.json(InfoLevel::Stations, ProtocolVersion::V3);
        assert!(doc.get("format").is_none());
    }

    #[test]
    fn stations_carry_sequence_ranges() {
        let fx = Fixture::new();
        for n in 0..3 {
            fx.feed("WLF", n);
        }
        fx.catalog.insert(&StationKey::new("IU", "ANMO"));

        let doc = fx.json(InfoLevel::Stations, ProtocolVersion::V4);
        let stations = doc["station"].as_array().unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0]["network"], "GE");
        assert_eq!(stations[0]["name"], "WLF");
        assert_eq!(stations[0]["begin_seq"], 0);
        assert_eq!(stations[0]["end_seq"], 2);
        assert!(stations[0].get("stream").is_none());
        // Known from the catalog, nothing held.
        assert_eq!(stations[1]["name"], "ANMO");
        assert!(stations[1].get("begin_seq").is_none());
    }

    #[test]
    fn streams_list_formats() {
        let fx = Fixture::new();
        fx.feed("WLF", 4);
        let doc = fx.json(InfoLevel::Streams, ProtocolVersion::V4);
        let stream = &doc["station"][0]["stream"][0];
        assert_eq!(stream["format"], "2");
        assert_eq!(stream["begin_seq"], 4);
    }

    #[test]
    fn connections_listed() {
        let fx = Fixture::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000);
        let guard = fx.connections.register(addr);
        guard.update(|c| {
            c.protocol = Some(ProtocolVersion::V4);
            c.state = "Streaming";
        });

        let doc = fx.json(InfoLevel::Connections, ProtocolVersion::V4);
        let conn = &doc["connection"][0];
        assert_eq!(conn["host"], "127.0.0.1");
        assert_eq!(conn["port"], 40_000);
        assert_eq!(conn["proto"], "4.0");
        assert_eq!(conn["state"], "Streaming");
        assert!(conn.get("useragent").is_none());
        assert!(doc["station"].as_array().unwrap().is_empty());
    }

    #[test]
    fn error_document() {
        let fx = Fixture::new();
        let bytes = build_error(ErrorCode::Arguments, "bad level", &fx.source()).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["error"]["code"], "ARGUMENTS");
        assert_eq!(doc["error"]["message"], "bad level");
    }
}
