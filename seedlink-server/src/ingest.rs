//! Feed ingest: decode producer frames, number them, publish them.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use seedlink4_protocol::frame::read_frame;
use seedlink4_protocol::{PayloadFormat, Record, SequenceNumber};
use tokio::io::AsyncBufRead;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::dispatcher::Published;
use crate::error::Result;
use crate::fanout::FanOut;
use crate::identity::{self, StationKey};
use crate::store::RecordStore;
use crate::subscription::glob_match;
use crate::transcode::TranscoderChain;

/// Next sequence number per `(station, format)`, shared by all producers.
#[derive(Default)]
pub(crate) struct SequenceBook {
    next: Mutex<HashMap<(StationKey, PayloadFormat), SequenceNumber>>,
}

impl SequenceBook {
    /// Assign a sequence to an undefined one, or keep a defined one and
    /// move the counter past it.
    pub fn assign(
        &self,
        key: &StationKey,
        format: PayloadFormat,
        sequence: SequenceNumber,
    ) -> SequenceNumber {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = next
            .entry((key.clone(), format))
            .or_insert(SequenceNumber::UNDEFINED.next());
        if sequence.is_undefined() {
            let assigned = *counter;
            *counter = assigned.next();
            assigned
        } else {
            if sequence >= *counter {
                *counter = sequence.next();
            }
            sequence
        }
    }
}

/// Stations seen on any feed since startup.
#[derive(Default)]
pub(crate) struct StationCatalog(Mutex<BTreeSet<StationKey>>);

impl StationCatalog {
    pub fn insert(&self, key: &StationKey) {
        let mut known = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !known.contains(key) {
            debug!(station = %key, "new station");
            known.insert(key.clone());
        }
    }

    /// Known stations, sorted by network then station.
    pub fn stations(&self) -> Vec<StationKey> {
        let known = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        known.iter().cloned().collect()
    }

    /// True if any known station matches the `STATION` arguments.
    pub fn knows(&self, station: &str, network: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|k| glob_match(station, &k.station) && glob_match(network, &k.network))
    }
}

/// Shared ingest state. Clone is cheap.
#[derive(Clone)]
pub(crate) struct Gateway {
    fanout: FanOut,
    store: RecordStore,
    sequences: Arc<SequenceBook>,
    catalog: Arc<StationCatalog>,
    transcoders: TranscoderChain,
    max_payload_len: usize,
}

impl Gateway {
    pub fn new(
        fanout: FanOut,
        store: RecordStore,
        catalog: Arc<StationCatalog>,
        transcoders: TranscoderChain,
        max_payload_len: usize,
    ) -> Self {
        Self {
            fanout,
            store,
            sequences: Arc::new(SequenceBook::default()),
            catalog,
            transcoders,
            max_payload_len,
        }
    }

    /// Read frames from a producer until EOF or shutdown.
    ///
    /// Returns the number of records published. A framing fault ends the
    /// feed with an error; the stream is never resynchronized.
    pub async fn run<R>(
        &self,
        reader: &mut R,
        peer: SocketAddr,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<u64>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut published = 0;
        loop {
            let record = tokio::select! {
                result = read_frame(reader, self.max_payload_len) => result?,
                _ = shutdown.changed() => {
                    debug!(%peer, "shutdown received during feed");
                    break;
                }
            };
            let Some(record) = record else {
                break;
            };
            if self.ingest(record).await.is_some() {
                published += 1;
            }
        }
        Ok(published)
    }

    /// Number, publish and transcode one record.
    ///
    /// Returns the sequence it was published under, or `None` if its station
    /// could not be determined.
    pub async fn ingest(&self, mut record: Record) -> Option<SequenceNumber> {
        let Some(key) = identity::identify(&record) else {
            warn!(
                family = %record.family,
                len = record.payload.len(),
                "cannot determine station of record, dropped"
            );
            return None;
        };
        self.catalog.insert(&key);

        let derived = self.transcoders.apply(record.format(), &record.payload);

        record.sequence = self.sequences.assign(&key, record.format(), record.sequence);
        let sequence = record.sequence;
        trace!(station = %key, %sequence, family = %record.family, "record ingested");
        self.publish(key.clone(), record).await;

        for t in derived {
            let mut extra = Record::extended(
                t.format,
                t.subformat,
                SequenceNumber::UNDEFINED,
                Some(key.station_id()),
                t.payload,
            );
            extra.sequence = self
                .sequences
                .assign(&key, extra.format(), SequenceNumber::UNDEFINED);
            trace!(station = %key, sequence = %extra.sequence, "derived record");
            self.publish(key.clone(), extra).await;
        }

        Some(sequence)
    }

    async fn publish(&self, key: StationKey, record: Record) {
        let item = Arc::new(Published { key, record });
        self.store.push(item.clone());
        let delivered = self.fanout.publish(item).await;
        trace!(delivered, "record published");
    }
}
