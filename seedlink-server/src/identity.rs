//! Station identity of ingested records.
//!
//! Producers do not announce which station a frame belongs to, so the
//! gateway works it out from the frame itself: the SE3 station id when
//! present, otherwise the miniSEED header inside the payload.

use seedlink4_protocol::{PayloadFormat, Record};

/// `(network, station)` pair that keys sequence numbering and subscriptions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationKey {
    pub network: String,
    pub station: String,
}

impl StationKey {
    pub fn new(network: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
        }
    }

    /// Parse an SE3 station id of the form `NET_STA`.
    pub fn from_station_id(id: &str) -> Option<Self> {
        let mut parts = id.split('_');
        let network = parts.next().filter(|s| is_code(s))?;
        let station = parts.next().filter(|s| is_code(s))?;
        Some(Self::new(network, station))
    }

    /// `NET_STA`, as carried in SE3 frames.
    pub fn station_id(&self) -> String {
        format!("{}_{}", self.network, self.station)
    }
}

impl std::fmt::Display for StationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.network, self.station)
    }
}

/// Work out which station `record` belongs to.
pub fn identify(record: &Record) -> Option<StationKey> {
    if let Some(key) = record.station_id.as_deref().and_then(StationKey::from_station_id) {
        return Some(key);
    }
    match record.format() {
        PayloadFormat::MiniSeed2 => from_mseed2_header(&record.payload),
        PayloadFormat::MiniSeed3 => from_mseed3_sid(&record.payload),
    }
}

const MSEED2_FIXED_HEADER_LEN: usize = 48;

// Station 8..13, location 13..15, channel 15..18, network 18..20, space padded.
fn from_mseed2_header(payload: &[u8]) -> Option<StationKey> {
    if payload.len() < MSEED2_FIXED_HEADER_LEN {
        return None;
    }
    let station = field(&payload[8..13])?;
    let network = field(&payload[18..20])?;
    Some(StationKey::new(network, station))
}

const MSEED3_FIXED_HEADER_LEN: usize = 40;
const MSEED3_SID_LEN_OFFSET: usize = 33;

// Source identifier such as `FDSN:GE_WLF__B_H_Z`.
fn from_mseed3_sid(payload: &[u8]) -> Option<StationKey> {
    if payload.len() < MSEED3_FIXED_HEADER_LEN || &payload[0..2] != b"MS" || payload[2] != 3 {
        return None;
    }
    let sid_len = payload[MSEED3_SID_LEN_OFFSET] as usize;
    let sid = payload.get(MSEED3_FIXED_HEADER_LEN..MSEED3_FIXED_HEADER_LEN + sid_len)?;
    let sid = std::str::from_utf8(sid).ok()?;
    let sid = sid.strip_prefix("FDSN:").unwrap_or(sid);
    StationKey::from_station_id(sid)
}

fn field(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?.trim_matches(' ');
    is_code(text).then(|| text.to_owned())
}

fn is_code(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use seedlink4_protocol::{PayloadSubformat, SequenceNumber};

    /// 512-byte miniSEED 2 payload with the given identity in its fixed header.
    pub(crate) fn mseed2_payload(network: &str, station: &str) -> Vec<u8> {
        let mut payload = vec![0u8; 512];
        payload[0..6].copy_from_slice(b"000001");
        payload[6] = b'D';
        payload[7] = b' ';
        payload[8..20].copy_from_slice(b"     00BHZ  ");
        payload[8..8 + station.len()].copy_from_slice(station.as_bytes());
        payload[18..18 + network.len()].copy_from_slice(network.as_bytes());
        payload
    }

    pub(crate) fn mseed3_payload(sid: &str, data_len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; MSEED3_FIXED_HEADER_LEN];
        payload[0..2].copy_from_slice(b"MS");
        payload[2] = 3;
        payload[MSEED3_SID_LEN_OFFSET] = sid.len() as u8;
        payload.extend_from_slice(sid.as_bytes());
        payload.extend(std::iter::repeat_n(0xEE, data_len));
        payload
    }

    #[test]
    fn station_id_parsing() {
        assert_eq!(
            StationKey::from_station_id("GE_WLF"),
            Some(StationKey::new("GE", "WLF"))
        );
        assert_eq!(
            StationKey::from_station_id("IU_ANMO_00_BHZ"),
            Some(StationKey::new("IU", "ANMO"))
        );
        assert_eq!(StationKey::from_station_id("GEWLF"), None);
        assert_eq!(StationKey::from_station_id("_WLF"), None);
        assert_eq!(StationKey::from_station_id("GE_"), None);
    }

    #[test]
    fn identify_from_mseed2_header() {
        let record = Record::legacy(SequenceNumber::UNDEFINED, mseed2_payload("GE", "WLF"));
        assert_eq!(identify(&record), Some(StationKey::new("GE", "WLF")));
    }

    #[test]
    fn identify_prefers_se3_station_id() {
        let record = Record::extended(
            PayloadFormat::MiniSeed3,
            Some(PayloadSubformat::Data),
            SequenceNumber::UNDEFINED,
            Some("IU_ANMO".into()),
            mseed3_payload("FDSN:GE_WLF__B_H_Z", 8),
        );
        assert_eq!(identify(&record), Some(StationKey::new("IU", "ANMO")));
    }

    #[test]
    fn identify_from_mseed3_sid() {
        let record = Record::extended(
            PayloadFormat::MiniSeed3,
            None,
            SequenceNumber::UNDEFINED,
            None,
            mseed3_payload("FDSN:GE_WLF__B_H_Z", 8),
        );
        assert_eq!(identify(&record), Some(StationKey::new("GE", "WLF")));
    }

    #[test]
    fn identify_fails_on_opaque_payload() {
        let record = Record::extended(
            PayloadFormat::MiniSeed2,
            None,
            SequenceNumber::UNDEFINED,
            None,
            vec![0u8; 512],
        );
        assert_eq!(identify(&record), None);

        let short = Record::extended(
            PayloadFormat::MiniSeed3,
            None,
            SequenceNumber::UNDEFINED,
            None,
            b"MS\x03".to_vec(),
        );
        assert_eq!(identify(&short), None);
    }

    #[test]
    fn display_and_station_id() {
        let key = StationKey::new("GE", "WLF");
        assert_eq!(key.to_string(), "GE_WLF");
        assert_eq!(key.station_id(), "GE_WLF");
    }
}
