//! Bounded per-stream record history.
//!
//! Every published record is kept in a ring per `(station, format)` so a
//! consumer can resume with `DATA <seq>` after a reconnect.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use seedlink4_protocol::{PayloadFormat, SequenceNumber};

use crate::dispatcher::{Published, StreamPlan};
use crate::identity::StationKey;

/// Sequence range held for one stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StreamRange {
    pub key: StationKey,
    pub format: PayloadFormat,
    pub begin: SequenceNumber,
    pub end: SequenceNumber,
}

struct StoreInner {
    rings: Mutex<HashMap<(StationKey, PayloadFormat), VecDeque<Arc<Published>>>>,
    capacity: usize,
}

/// Thread-safe record history. Clone is cheap (Arc).
#[derive(Clone)]
pub(crate) struct RecordStore(Arc<StoreInner>);

impl RecordStore {
    /// Keep at most `capacity` records per stream. Zero keeps nothing.
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(StoreInner {
            rings: Mutex::new(HashMap::new()),
            capacity,
        }))
    }

    fn rings(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(StationKey, PayloadFormat), VecDeque<Arc<Published>>>>
    {
        self.0.rings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a published record, evicting the oldest of its stream when full.
    pub fn push(&self, item: Arc<Published>) {
        if self.0.capacity == 0 {
            return;
        }
        let mut rings = self.rings();
        let ring = rings
            .entry((item.key.clone(), item.record.format()))
            .or_default();
        ring.push_back(item);
        if ring.len() > self.0.capacity {
            ring.pop_front();
        }
    }

    /// Records with sequence `>= start` that `plan` wants.
    ///
    /// Each stream comes out in the order it was published; streams are
    /// grouped by station.
    pub fn read_from(&self, start: SequenceNumber, plan: &StreamPlan) -> Vec<Arc<Published>> {
        let rings = self.rings();
        let mut keys: Vec<_> = rings.keys().collect();
        keys.sort_by(|a, b| (&a.0, a.1.to_byte()).cmp(&(&b.0, b.1.to_byte())));

        keys.into_iter()
            .flat_map(|key| rings[key].iter())
            .filter(|item| item.record.sequence >= start && plan.wants(item))
            .cloned()
            .collect()
    }

    /// First and last sequence held per stream, sorted by station then format.
    pub fn ranges(&self) -> Vec<StreamRange> {
        let rings = self.rings();
        let mut ranges: Vec<StreamRange> = rings
            .iter()
            .filter_map(|((key, format), ring)| {
                let begin = ring.iter().map(|i| i.record.sequence).min()?;
                let end = ring.iter().map(|i| i.record.sequence).max()?;
                Some(StreamRange {
                    key: key.clone(),
                    format: *format,
                    begin,
                    end,
                })
            })
            .collect();
        ranges.sort_by(|a, b| (&a.key, a.format.to_byte()).cmp(&(&b.key, b.format.to_byte())));
        ranges
    }
}
