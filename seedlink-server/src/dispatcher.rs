//! Per-consumer outbound queue and the worker that drains it to the socket.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use seedlink4_protocol::{AcceptCode, FrameFamily, PayloadFormat, Record, SequenceNumber};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::config::QueuePolicy;
use crate::error::Result;
use crate::identity::StationKey;
use crate::subscription::Subscription;

/// A record as published to the fan-out, with its station identity resolved.
#[derive(Debug)]
pub(crate) struct Published {
    pub key: StationKey,
    pub record: Record,
}

/// What a consumer committed to with `DATA`.
#[derive(Clone, Debug)]
pub(crate) struct StreamPlan {
    pub subscription: Subscription,
    pub accept: Vec<AcceptCode>,
    /// Extended framing (SE2/SE3) instead of legacy frames.
    pub extended: bool,
    /// First sequence to replay from the record store. `None` is live only.
    pub start: Option<SequenceNumber>,
}

impl StreamPlan {
    pub fn wants(&self, item: &Published) -> bool {
        let format = item.record.format();
        let subformat = item.record.subformat;
        self.subscription.matches(&item.key, format, subformat)
            && (self.accept.is_empty() || self.accept.iter().any(|a| a.covers(format, subformat)))
    }

    /// Frame family for `record`, or `None` if this consumer cannot receive it.
    pub fn family_for(&self, record: &Record) -> Option<FrameFamily> {
        if self.extended {
            Some(record.format().extended_family())
        } else if record.fits(FrameFamily::Legacy) {
            Some(FrameFamily::Legacy)
        } else {
            None
        }
    }
}

struct QueueState {
    items: VecDeque<Arc<Published>>,
    closed: bool,
    dropped: u64,
}

/// Bounded FIFO between the fan-out (writer) and one consumer worker (reader).
pub(crate) struct OutboundQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: QueuePolicy,
    items_ready: Notify,
    space_ready: Notify,
}

impl OutboundQueue {
    pub fn new(capacity: usize, policy: QueuePolicy) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
                dropped: 0,
            }),
            capacity: capacity.max(1),
            policy,
            items_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a record. Returns `false` once the queue has been closed.
    pub async fn push(&self, item: Arc<Published>) -> bool {
        loop {
            let space = self.space_ready.notified();
            tokio::pin!(space);
            space.as_mut().enable();

            let queued = {
                let mut state = self.lock();
                if state.closed {
                    return false;
                }
                let full = state.items.len() >= self.capacity;
                if full && self.policy == QueuePolicy::DropOldest {
                    if let Some(old) = state.items.pop_front() {
                        state.dropped += 1;
                        warn!(
                            station = %old.key,
                            sequence = %old.record.sequence,
                            dropped = state.dropped,
                            "consumer queue full, dropping oldest record"
                        );
                    }
                }
                if full && self.policy == QueuePolicy::Block {
                    false
                } else {
                    state.items.push_back(Arc::clone(&item));
                    true
                }
            };

            if queued {
                self.items_ready.notify_one();
                return true;
            }
            space.await;
        }
    }

    /// Dequeue the next record, waiting if necessary. `None` once closed.
    pub async fn pop(&self) -> Option<Arc<Published>> {
        loop {
            let ready = self.items_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.space_ready.notify_one();
                    return Some(item);
                }
            }
            ready.await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Close the queue and discard anything still pending.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.items.clear();
        }
        self.items_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[cfg(test)]
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

/// Drain `backlog`, then `queue`, into `writer`, re-framing each record for
/// this consumer.
///
/// The consumer registers before the backlog is read, so a record can show
/// up in both. Live records at or below the last backlog sequence of their
/// stream are skipped. Returns when the queue is closed or the write side
/// fails.
pub(crate) async fn drain<W>(
    queue: &OutboundQueue,
    plan: &StreamPlan,
    backlog: Vec<Arc<Published>>,
    writer: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut replayed: HashMap<(StationKey, PayloadFormat), SequenceNumber> = HashMap::new();
    for item in backlog {
        send(&item, plan, writer).await?;
        replayed.insert((item.key.clone(), item.record.format()), item.record.sequence);
    }
    if !replayed.is_empty() {
        writer.flush().await?;
    }

    while let Some(item) = queue.pop().await {
        if !replayed.is_empty() {
            let stream = (item.key.clone(), item.record.format());
            if replayed.get(&stream).is_some_and(|last| item.record.sequence <= *last) {
                trace!(station = %item.key, sequence = %item.record.sequence, "already replayed");
                continue;
            }
        }
        send(&item, plan, writer).await?;
        if queue.is_empty() {
            writer.flush().await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

async fn send<W>(item: &Published, plan: &StreamPlan, writer: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(family) = plan.family_for(&item.record) else {
        trace!(
            station = %item.key,
            format = ?item.record.format(),
            len = item.record.payload.len(),
            "record not representable for consumer, skipped"
        );
        return Ok(());
    };
    let frame = encode_for(item, family)?;
    writer.write_all(&frame).await?;
    trace!(station = %item.key, sequence = %item.record.sequence, %family, "frame sent");
    Ok(())
}

fn encode_for(item: &Published, family: FrameFamily) -> Result<Vec<u8>> {
    if family == FrameFamily::Se3 && item.record.station_id.is_none() {
        let mut record = item.record.clone();
        record.station_id = Some(item.key.station_id());
        return Ok(record.encode_as(family)?);
    }
    Ok(item.record.encode_as(family)?)
}
