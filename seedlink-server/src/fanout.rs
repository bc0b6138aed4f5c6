//! Broadcast fan-out from producers to consumer queues.
//!
//! Maintains a thread-safe registry of streaming consumers. Producers
//! publish into every queue whose plan wants the record.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::dispatcher::{OutboundQueue, Published, StreamPlan};

#[derive(Clone)]
struct ConsumerEntry {
    addr: SocketAddr,
    plan: Arc<StreamPlan>,
    queue: Arc<OutboundQueue>,
}

struct FanOutInner {
    next_id: AtomicU64,
    consumers: Mutex<HashMap<u64, ConsumerEntry>>,
}

/// Thread-safe consumer registry. Clone is cheap (Arc).
#[derive(Clone)]
pub(crate) struct FanOut(Arc<FanOutInner>);

impl FanOut {
    pub fn new() -> Self {
        Self(Arc::new(FanOutInner {
            next_id: AtomicU64::new(1),
            consumers: Mutex::new(HashMap::new()),
        }))
    }

    fn consumers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, ConsumerEntry>> {
        self.0.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a consumer. It stays registered until the returned guard is dropped.
    pub fn register(
        &self,
        addr: SocketAddr,
        plan: Arc<StreamPlan>,
        queue: Arc<OutboundQueue>,
    ) -> Registration {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        self.consumers().insert(
            id,
            ConsumerEntry {
                addr,
                plan,
                queue: queue.clone(),
            },
        );
        debug!(%addr, id, "consumer registered");
        Registration {
            fanout: self.clone(),
            id,
            queue,
        }
    }

    fn unregister(&self, id: u64) {
        if let Some(entry) = self.consumers().remove(&id) {
            debug!(addr = %entry.addr, id, "consumer unregistered");
        }
    }

    /// Deliver `item` to every consumer that wants it. Returns how many took it.
    ///
    /// The registry lock is released before any queue is touched, so a
    /// blocking queue never stalls registration.
    pub async fn publish(&self, item: Arc<Published>) -> usize {
        let targets: Vec<Arc<OutboundQueue>> = self
            .consumers()
            .values()
            .filter(|c| c.plan.wants(&item))
            .map(|c| c.queue.clone())
            .collect();

        let mut delivered = 0;
        for queue in targets {
            if queue.push(item.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of registered consumers.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.consumers().len()
    }
}

/// Keeps a consumer in the fan-out. Dropping it unregisters the consumer and
/// closes its queue.
pub(crate) struct Registration {
    fanout: FanOut,
    id: u64,
    queue: Arc<OutboundQueue>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.fanout.unregister(self.id);
        self.queue.close();
    }
}
